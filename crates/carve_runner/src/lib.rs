//! # carve_runner
//!
//! Container compose runtime wrapper for carve.
//!
//! Every generated system is built and run through a compose descriptor.
//! This crate is the only place that talks to the container engine.
//!
//! # Features
//!
//! - **Compose Runtime Trait**: build, up, ps, logs, down with per-call timeouts
//! - **Runtime Detection**: Auto-detect Docker vs Podman
//! - **Daemon Probe**: Docker API ping for reachability checks
//! - **`ps` Compatibility Shim**: arrays, JSON lines and concatenated objects
//! - **Project Namespacing**: one compose project per migration job
//! - **Mock Runtime**: scripted responses for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use carve_runner::{CliComposeRuntime, CliRuntimeOptions, ComposeProject, ComposeRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CliComposeRuntime::new(CliRuntimeOptions::default())?;
//!     let project = ComposeProject::for_job("job-1", "./out/docker-compose.yml");
//!
//!     let build = runtime.build(&project, true, Duration::from_secs(600)).await?;
//!     println!("Build exit code: {}", build.exit_code);
//!
//!     for service in runtime.ps(&project, Duration::from_secs(30)).await? {
//!         println!("{}: {} ({})", service.service, service.state, service.health);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod docker;
pub mod error;
pub mod mock;
pub mod ps;
pub mod runner;

pub use cli::{CliComposeRuntime, CliRuntimeOptions, ContainerRuntime};
pub use config::{sanitize_project_name, ComposeProject};
pub use docker::DockerDaemon;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockComposeRuntime, MockResponse};
pub use ps::{parse_ps_output, repair_concatenated_objects, ServiceState};
pub use runner::{CommandOutput, ComposeRuntime};
