//! # Siteminer
//!
//! A training-data collection service for website design patterns.
//!
//! Siteminer resolves a business profile into competitor websites, collects
//! their markup (headless render, plain HTTP, or a deterministic synthetic
//! substitute), analyzes each page's design signals, and persists the
//! results for downstream model training. Runs are single-flight per
//! process and polled over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Planner   │──▶│ Collector │──▶│ Analyzer   │──▶│  Store    │
//! │ classify+ │   │ render /  │   │ colors,    │   │ SQLite or │
//! │ freshness │   │ http /    │   │ fonts,     │   │ files     │
//! │ gate      │   │ synthetic │   │ layout     │   │           │
//! └─────┬────┘   └──────────┘   └───────────┘   └────┬─────┘
//!       │                                            │
//!       └──────────────┐              ┌──────────────┘
//!                      ▼              ▼
//!                 ┌─────────────────────────┐
//!                 │   Orchestrator + HTTP    │
//!                 │ single-flight sessions   │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! siteminer init                        # create database schema
//! siteminer serve                       # start the HTTP server
//! siteminer train global --samples 10   # one-shot global run
//! siteminer train custom --site https://example.com --business-type florist
//! siteminer status                      # latest session snapshot
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`freshness`] | The 30-day staleness gate |
//! | [`classifier`] | LLM business-type classifier client |
//! | [`planner`] | Candidate resolution and freshness filtering |
//! | [`collector`] | Site collection strategies |
//! | [`synthetic`] | Deterministic synthetic page generation |
//! | [`analyzer`] | Static design analysis |
//! | [`orchestrator`] | Single-flight training pipeline |
//! | [`store`] | Storage abstraction and backends |
//! | [`server`] | HTTP API |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod freshness;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod server;
pub mod store;
pub mod synthetic;
