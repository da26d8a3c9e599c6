//! Autofix collaborator backed by a chat-completions model.

use anyhow::{bail, Result};

use crate::{
    config::Config,
    llm::{ChatMessage, ChatOptions, LlmClient, Role},
};

use super::{FixGenerator, GeneratedArtifact};

const FIX_ROLE: &str = "You repair generated code that failed while running in a live preview.\n\
You receive the current code and every error it produced, in order.\n\
Reply with the corrected, complete code in a single fenced code block, then one short paragraph explaining the fix.\n\
Keep the language and the overall behavior of the original code.";

pub struct LlmFixGenerator {
    client: LlmClient,
    model: String,
}

impl LlmFixGenerator {
    pub fn from_config(cfg: &Config, model: &str) -> Result<Self> {
        Ok(Self { client: LlmClient::from_config(cfg)?, model: model.to_string() })
    }
}

impl FixGenerator for LlmFixGenerator {
    async fn regenerate(&self, code: &str, error_context: &str) -> Result<GeneratedArtifact> {
        let prompt = format!(
            "Current code:\n```\n{}\n```\n\nErrors:\n```\n{}\n```",
            code, error_context
        );
        let messages = vec![ChatMessage::new(Role::System, FIX_ROLE), ChatMessage::new(Role::User, prompt)];
        let opts = ChatOptions { model: self.model.clone(), temperature: 0.0, max_tokens: 4096 };
        let reply = self.client.complete(messages, opts).await?;
        split_reply(&reply)
    }
}

/// Pull the first fenced block out as code; surrounding prose becomes the explanation.
pub fn split_reply(reply: &str) -> Result<GeneratedArtifact> {
    let Some(open) = reply.find("```") else {
        let code = reply.trim();
        if code.is_empty() {
            bail!("model returned an empty reply");
        }
        return Ok(GeneratedArtifact { code: code.to_string(), explanation: String::new() });
    };
    let after_fence = &reply[open + 3..];
    // drop the language tag line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    let Some(close) = body.find("```") else {
        bail!("unterminated code block in model reply");
    };
    let code = body[..close].trim_end().to_string();
    let explanation = format!("{} {}", reply[..open].trim(), body[close + 3..].trim())
        .trim()
        .to_string();
    Ok(GeneratedArtifact { code, explanation })
}
