//! The backend action run on a cache miss.
//!
//! cmdgpt never talks to a model API itself. It renders the configured
//! command template, runs it with the prompt on stdin, and treats its stdout
//! as the response.

mod executor;
mod template;

pub use executor::{Backend, BackendRequest};
pub use template::{TemplateError, render_template};
