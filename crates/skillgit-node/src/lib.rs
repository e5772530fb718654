//! # skillgit node
//!
//! Serves skills as read-only git repositories, so that
//!
//! ```bash
//! git clone http://127.0.0.1:8080/pdf.git
//! ```
//!
//! works against content that is never stored as a repository. Each
//! request looks the skill up in a [`source::SkillSource`] and synthesizes
//! the repository with `skillgit-git`.
//!
//! ## Modules
//!
//! - [`api`] - Router and git HTTP endpoints (dumb and smart)
//! - [`config`] - Node configuration
//! - [`observability`] - Structured logging
//! - [`source`] - Skill content lookup
//!
//! ## Example: Creating a router
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skillgit_node::api::{create_router, AppState};
//! use skillgit_node::source::{MemorySkillSource, Skill};
//!
//! let skills = MemorySkillSource::new();
//! skills.insert(Skill::new("pdf", "# PDF tools\n"));
//!
//! let app = create_router(AppState::new(Arc::new(skills)));
//! ```

pub mod api;
pub mod config;
pub mod observability;
pub mod source;
