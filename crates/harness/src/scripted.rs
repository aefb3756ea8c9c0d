//! In-memory transport that plays back a scripted bot

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::transport::{sanitize_all, Transport};

/// One scripted bot turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedTurn {
    /// Delivered in answer to the next message sent
    Reply(Vec<String>),
    /// Delivered while the driver is polling, without a message being sent
    Unsolicited(Vec<String>),
}

/// On-disk form of a script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Messages that never consume a turn (e.g. the cancel keyword)
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Each turn is a one-key map: `- reply: [...]` or `- unsolicited: [...]`
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub turns: Vec<ScriptedTurn>,
}

impl Script {
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Transport backed by a queue of scripted turns.
///
/// Every send is recorded. A send that is not ignored answers with the next
/// turn if it is a [`ScriptedTurn::Reply`]. A [`ScriptedTurn::Unsolicited`]
/// turn at the head of the queue arrives on the second count poll after the
/// last read, provided nothing else arrived since that read, so it always
/// lands after the driver has taken its baseline. An exhausted script is
/// silent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    turns: VecDeque<ScriptedTurn>,
    ignore: BTreeSet<String>,
    fragments: Vec<String>,
    sent: Vec<String>,
    resets: usize,
    polls_since_read: usize,
    delivered_since_read: bool,
    fail_send_at: Option<usize>,
    fail_reset: bool,
}

impl ScriptedTransport {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: turns.into(),
            ..Default::default()
        }
    }

    /// Every turn answers a send
    pub fn replies<I, T, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            turns
                .into_iter()
                .map(|t| ScriptedTurn::Reply(t.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }

    pub fn from_script(script: Script) -> Self {
        Self::new(script.turns).ignoring(script.ignore)
    }

    /// Messages that are recorded but never answered
    pub fn ignoring<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(texts.into_iter().map(Into::into));
        self
    }

    /// Make the `index`-th send (0-based, ignored messages included) fail
    pub fn failing_send_at(mut self, index: usize) -> Self {
        self.fail_send_at = Some(index);
        self
    }

    /// Make every conversation reset fail
    pub fn failing_resets(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Number of conversation resets requested
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Turns not yet delivered
    pub fn remaining(&self) -> usize {
        self.turns.len()
    }

    fn deliver(&mut self, fragments: Vec<String>) {
        debug!("Scripted bot delivers {} fragment(s)", fragments.len());
        self.fragments.extend(fragments);
        self.delivered_since_read = true;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(&mut self, text: &str) -> HarnessResult<()> {
        let index = self.sent.len();
        self.sent.push(text.to_string());

        if self.fail_send_at == Some(index) {
            return Err(HarnessError::Transport(format!(
                "composer unavailable while sending {:?}",
                text
            )));
        }

        if self.ignore.contains(text) {
            return Ok(());
        }

        if let Some(ScriptedTurn::Reply(_)) = self.turns.front() {
            if let Some(ScriptedTurn::Reply(fragments)) = self.turns.pop_front() {
                self.deliver(fragments);
            }
        }
        Ok(())
    }

    async fn fragment_count(&mut self) -> HarnessResult<usize> {
        self.polls_since_read += 1;

        if self.polls_since_read >= 2 && !self.delivered_since_read {
            if let Some(ScriptedTurn::Unsolicited(_)) = self.turns.front() {
                if let Some(ScriptedTurn::Unsolicited(fragments)) = self.turns.pop_front() {
                    self.deliver(fragments);
                }
            }
        }

        Ok(self.fragments.len())
    }

    async fn fragments_since(&mut self, baseline: usize) -> HarnessResult<Vec<String>> {
        self.polls_since_read = 0;
        self.delivered_since_read = false;
        let start = baseline.min(self.fragments.len());
        Ok(sanitize_all(&self.fragments[start..]))
    }

    async fn reset_conversation(&mut self) -> HarnessResult<()> {
        self.resets += 1;
        if self.fail_reset {
            return Err(HarnessError::Transport("clear chat menu not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_turns_answer_sends() {
        let mut transport = ScriptedTransport::replies([vec!["uno"], vec!["dos", "tres"]]);

        assert_eq!(transport.fragment_count().await.unwrap(), 0);
        transport.send_text("hola").await.unwrap();
        assert_eq!(transport.fragment_count().await.unwrap(), 1);

        transport.send_text("otra").await.unwrap();
        assert_eq!(transport.fragments_since(1).await.unwrap(), vec!["dos", "tres"]);
        assert_eq!(transport.sent(), ["hola", "otra"]);
    }

    #[tokio::test]
    async fn test_ignored_sends_do_not_consume_turns() {
        let mut transport = ScriptedTransport::replies([vec!["uno"]]).ignoring(["cancelar"]);
        transport.send_text("cancelar").await.unwrap();
        assert_eq!(transport.fragment_count().await.unwrap(), 0);
        assert_eq!(transport.remaining(), 1);
    }

    #[tokio::test]
    async fn test_unsolicited_turn_arrives_after_baseline() {
        let mut transport = ScriptedTransport::new(vec![ScriptedTurn::Unsolicited(vec![
            "sigo aquí".to_string(),
        ])]);

        let baseline = transport.fragment_count().await.unwrap();
        assert_eq!(baseline, 0);
        assert_eq!(transport.fragment_count().await.unwrap(), 1);
        assert_eq!(transport.fragments_since(baseline).await.unwrap(), vec!["sigo aquí"]);
    }

    #[tokio::test]
    async fn test_send_failure_injection() {
        let mut transport = ScriptedTransport::replies([vec!["uno"]]).failing_send_at(1);
        transport.send_text("a").await.unwrap();
        assert!(transport.send_text("b").await.is_err());
        transport.send_text("c").await.unwrap();
        assert_eq!(transport.sent().len(), 3);
    }

    #[test]
    fn test_script_from_yaml() {
        let yaml = r#"
ignore: [cancelar]
turns:
  - reply: ["Nombre del cultivo."]
  - unsolicited: ["Un momento..."]
  - reply: ["Cultivo creado exitosamente"]
"#;
        let script = Script::from_yaml(yaml).unwrap();
        assert_eq!(script.turns.len(), 3);
        assert_eq!(
            script.turns[1],
            ScriptedTurn::Unsolicited(vec!["Un momento...".to_string()])
        );

        let transport = ScriptedTransport::from_script(script);
        assert_eq!(transport.remaining(), 3);
    }

    #[test]
    fn test_script_writes_turns_as_maps() {
        let script = Script {
            ignore: vec![],
            turns: vec![ScriptedTurn::Reply(vec!["hola".to_string()])],
        };
        let yaml = serde_yaml::to_string(&script).unwrap();
        assert!(yaml.contains("- reply:"), "{yaml}");
        assert!(!yaml.contains('!'), "{yaml}");
        assert_eq!(Script::from_yaml(&yaml).unwrap(), script);
    }

    #[test]
    fn test_script_rejects_unknown_turn_kind() {
        let yaml = "turns:\n  - shout: [\"hola\"]\n";
        assert!(Script::from_yaml(yaml).is_err());
    }
}
