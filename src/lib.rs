//! # EduNexus
//!
//! A learning-content service for students, teachers and admins.
//!
//! Teachers publish links, videos, documents and quizzes. Students save them,
//! mark them complete and receive ranked recommendations built from their
//! learning preferences. An assistant answers chat messages with matching
//! library items. Gemini or OpenAI can phrase recommendation reasons, write
//! summaries and answer chat; every AI feature has a rule-based fallback.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │   HTTP   │──▶│ content /    │──▶│  SQLite  │
//! │  (axum)  │   │ recommend /  │   │  (sqlx)  │
//! └──────────┘   │ assistant    │   └──────────┘
//!      ▲         └──────┬───────┘
//!      │                ▼
//! ┌──────────┐   ┌──────────────┐
//! │   CLI    │   │ Gemini /     │
//! │(edunexus)│   │ OpenAI       │
//! └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! edunexus init          # create database
//! edunexus seed          # default admin / student / teacher accounts
//! edunexus serve         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and JSON resources |
//! | [`db`] / [`migrate`] | Database connection and schema |
//! | [`auth`] | Passwords, bearer tokens, role extractors |
//! | [`users`] | Account storage and admin management |
//! | [`content`] / [`tags`] / [`uploads`] | Content library |
//! | [`interactions`] / [`saved`] / [`preferences`] | Per-student state |
//! | [`recommend`] | Rule-based recommendation scorer |
//! | [`summarize`] | Content summaries |
//! | [`assistant`] | Chat assistant |
//! | [`ai`] | Generative AI clients |
//! | [`dashboard`] | Per-role aggregates |
//! | [`server`] / [`routes`] | HTTP API |

pub mod ai;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod content;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod interactions;
pub mod migrate;
pub mod models;
pub mod pagination;
pub mod preferences;
pub mod recommend;
pub mod routes;
pub mod saved;
pub mod server;
pub mod summarize;
pub mod tags;
pub mod uploads;
pub mod users;
pub mod validate;
