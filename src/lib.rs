//! # Quizcast
//!
//! This library runs live multiple-choice quiz sessions over a
//! publish/subscribe bus. One orchestrator broadcasts questions to any
//! number of players, collects at most one answer per player and round
//! under a deadline, scores the answers, and publishes live and final
//! standings. Each player mirrors the rounds with its own countdown and
//! answers with a "no answer" sentinel when time runs out.
//!
//! The [`orchestrator`] and [`controller`] state machines are synchronous
//! and transport-agnostic; [`runtime`] drives them as tokio tasks over any
//! [`bus::Bus`] and [`bus::Inbox`].

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::missing_panics_doc)]

pub mod answers;
pub mod bus;
pub mod config;
pub mod constants;
pub mod controller;
pub mod leaderboard;
pub mod message;
pub mod orchestrator;
pub mod player;
pub mod presence;
pub mod question;
pub mod runtime;

pub use config::{Config, StartRequest};
pub use orchestrator::{Orchestrator, Report, StartError};
