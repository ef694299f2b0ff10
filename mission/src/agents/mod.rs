//! Model-backed agents of the generation pipeline.
//!
//! Each agent renders its prompt, asks the [`TextCompletion`] collaborator,
//! and turns the reply into typed data. Malformed replies are
//! [`MissionError::PlanParseError`], never partial results.

pub mod architect;
pub mod coder;
pub mod finalizer;
pub mod repair;
pub mod tester;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::json_extract::extract_json_object;
use crate::error::MissionError;
use crate::io::model::{Role, TextCompletion};

pub use architect::PlanGenerator;
pub use coder::CodeGenerator;
pub use finalizer::DiffFinalizer;
pub use repair::{RepairAgent, RepairContext, RepairProposal};
pub use tester::TestGenerator;

/// Stream a completion, handing every chunk to `on_chunk`, and return the whole text.
pub(crate) async fn collect_stream(
    model: &dyn TextCompletion,
    role: Role,
    prompt: &str,
    mut on_chunk: impl FnMut(&str),
) -> Result<String, MissionError> {
    let mut stream = model.stream(role, prompt).await?;
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        on_chunk(&chunk);
        text.push_str(&chunk);
    }
    Ok(text)
}

/// Extract the JSON object in `response` and deserialize it.
pub(crate) fn parse_reply<T: DeserializeOwned>(role: Role, response: &str) -> Result<T, MissionError> {
    let value: Value = extract_json_object(response)
        .map_err(|err| MissionError::PlanParseError(format!("{role} reply: {err}")))?;
    serde_json::from_value(value)
        .map_err(|err| MissionError::PlanParseError(format!("{role} reply has the wrong shape: {err}")))
}

/// Reject empty, absolute, or escaping file names proposed by a model.
pub(crate) fn check_relative_filename(role: Role, filename: &str) -> Result<(), MissionError> {
    let trimmed = filename.trim();
    let escapes = trimmed.split(['/', '\\']).any(|part| part == "..");
    if trimmed.is_empty()
        || trimmed.starts_with('/')
        || trimmed.starts_with('\\')
        || trimmed.contains(':')
        || escapes
    {
        return Err(MissionError::PlanParseError(format!(
            "{role} reply names an invalid file '{filename}'"
        )));
    }
    Ok(())
}
