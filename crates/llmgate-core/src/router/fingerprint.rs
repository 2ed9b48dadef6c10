//! Cache keys derived from resolved requests

use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::{Message, SamplingParams};

/// Deterministic cache key for a resolved request.
///
/// The digest always covers agent id, provider and model in addition to the message
/// content, so identical prompts from different agents or for different models never share
/// an entry. Every field is length-prefixed before hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a resolved request
    pub fn compute(
        agent_id: &str,
        provider: &str,
        model: &str,
        messages: &[Message],
        sampling: &SamplingParams,
    ) -> Self {
        let mut hasher = Sha256::new();

        write_field(&mut hasher, agent_id.as_bytes());
        write_field(&mut hasher, provider.as_bytes());
        write_field(&mut hasher, model.as_bytes());

        hasher.update((messages.len() as u64).to_le_bytes());
        for message in messages {
            write_field(&mut hasher, message.role.trim().to_ascii_lowercase().as_bytes());
            write_field(&mut hasher, message.content.trim().as_bytes());
        }

        write_field(&mut hasher, canonical_sampling(sampling).as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an existing hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn canonical_sampling(sampling: &SamplingParams) -> String {
    fn opt<T: fmt::Display>(value: Option<T>) -> String {
        value.map_or_else(|| "-".to_string(), |v| v.to_string())
    }

    format!(
        "t={};m={};p={}",
        opt(sampling.temperature),
        opt(sampling.max_tokens),
        opt(sampling.top_p)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn messages() -> Vec<Message> {
        vec![Message::system("be brief"), Message::user("hello")]
    }

    fn fp(agent: &str, provider: &str, model: &str, messages: &[Message]) -> Fingerprint {
        Fingerprint::compute(agent, provider, model, messages, &SamplingParams::default())
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            fp("ada", "anthropic", "claude-3-opus", &messages()),
            fp("ada", "anthropic", "claude-3-opus", &messages())
        );
    }

    #[test]
    fn test_agent_and_model_are_inputs() {
        let base = fp("ada", "anthropic", "claude-3-opus", &messages());

        assert_ne!(base, fp("lea", "anthropic", "claude-3-opus", &messages()));
        assert_ne!(base, fp("ada", "anthropic", "claude-3-haiku", &messages()));
        assert_ne!(base, fp("ada", "openrouter", "claude-3-opus", &messages()));
    }

    #[test]
    fn test_normalizes_whitespace_and_role_case() {
        let noisy = vec![Message::new(" System", "be brief  "), Message::new("USER", "\nhello")];
        assert_eq!(
            fp("ada", "anthropic", "claude-3-opus", &messages()),
            fp("ada", "anthropic", "claude-3-opus", &noisy)
        );
    }

    #[test]
    fn test_sampling_params_are_inputs() {
        let hot = SamplingParams {
            temperature: Some(0.9),
            ..SamplingParams::default()
        };
        assert_ne!(
            fp("ada", "openai", "gpt-4o", &messages()),
            Fingerprint::compute("ada", "openai", "gpt-4o", &messages(), &hot)
        );
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        assert_ne!(
            fp("ab", "c", "gpt-4o", &messages()),
            fp("a", "bc", "gpt-4o", &messages())
        );
    }

    proptest! {
        #[test]
        fn prop_distinct_agents_never_collide(
            a in "[a-z]{1,12}",
            b in "[a-z]{1,12}",
            content in ".{0,64}"
        ) {
            prop_assume!(a != b);
            let msgs = vec![Message::user(content)];
            prop_assert_ne!(
                fp(&a, "openai", "gpt-4o", &msgs),
                fp(&b, "openai", "gpt-4o", &msgs)
            );
        }
    }
}
