//! Programmatic Tool-Calling.
//!
//! The adapter in this module collapses a set of PTC-enabled tools into one
//! synthetic `code_execution` tool backed by a per-generator script session.
//! Regular tools pass through untouched.

pub mod javascript;
pub mod session;

pub use session::{EvalOutcome, Session};

use crate::tool::Tool;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Script languages a PTC adapter can target. Only JavaScript is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgramLanguage {
    #[default]
    #[serde(rename = "js")]
    JavaScript,
    Python,
    Go,
    Lua,
}

impl std::fmt::Display for ProgramLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProgramLanguage::JavaScript => "js",
            ProgramLanguage::Python => "python",
            ProgramLanguage::Go => "go",
            ProgramLanguage::Lua => "lua",
        };
        write!(f, "{}", name)
    }
}

const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the script session for one generator.
///
/// The session is created lazily on first use and survives until the runtime
/// is dropped or [`Runtime::reset`] is called. It is not shared across
/// generators.
pub struct Runtime {
    session: StdMutex<Option<Arc<Session>>>,
    timeout: Duration,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SCRIPT_TIMEOUT)
    }

    /// A runtime whose sessions interrupt scripts after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Runtime {
            session: StdMutex::new(None),
            timeout,
        }
    }

    /// The current session, creating one if absent.
    pub fn ensure_session(&self) -> crate::Result<Arc<Session>> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| crate::Error::runtime("script runtime lock poisoned"))?;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        tracing::debug!(timeout = ?self.timeout, "starting script session");
        let session = Arc::new(Session::spawn(self.timeout)?);
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Tear down the current session, if any. Bindings and script state are
    /// lost; the next use creates a fresh session. Idempotent and safe to call
    /// from any thread.
    pub fn reset(&self) {
        if let Ok(mut guard) = self.session.lock() {
            if guard.take().is_some() {
                tracing::debug!("script session torn down");
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Partition tools by their PTC flag into (regular, ptc).
pub fn extract_ptc_tools(tools: Vec<Tool>) -> (Vec<Tool>, Vec<Tool>) {
    tools.into_iter().partition(|t| !t.use_ptc)
}

/// Adapt a set of PTC tools into a single code-execution tool plus the
/// system-prompt fragment describing the execution contract.
pub fn adapt_tools_to_ptc(
    runtime: &Runtime,
    ptc_tools: &[Tool],
    language: ProgramLanguage,
) -> crate::Result<(Tool, String)> {
    match language {
        ProgramLanguage::JavaScript => javascript::adapt_tools(runtime, ptc_tools),
        other => Err(crate::Error::configuration(format!(
            "ptc {} not implemented",
            other
        ))),
    }
}
