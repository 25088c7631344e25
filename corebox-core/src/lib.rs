#![doc = "corebox-core: core logic library for corebox."]

//! This crate holds the portal-agnostic workflow logic: manifest parsing,
//! duplicate reconciliation, drill hole provisioning, upload orchestration,
//! run reporting and the read-side exports. All remote access goes through the
//! [`contract::PortalApi`] trait; the HTTP implementation lives in the CLI crate.
//!
//! # Usage
//! Build a [`config::PortalConfig`], implement or mock [`contract::PortalApi`],
//! then call [`synchronise::synchronise`] or one of the [`export`] workflows.

pub mod auth;
pub mod config;
pub mod contract;
pub mod export;
pub mod manifest;
pub mod model;
pub mod orchestrate;
pub mod provision;
pub mod reconcile;
pub mod report;
pub mod synchronise;
