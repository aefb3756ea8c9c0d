//! Per-run state and the value providers that feed it
//!
//! A [`RunContext`] is owned by whoever drives runs and handed to the driver
//! by `&mut`; nothing in it survives [`RunContext::reset`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::{NoExpand, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

use botcheck_common::{reference, VariableBindings};

use crate::error::HarnessResult;
use crate::log::ConversationLog;

/// Length of the suffix appended on a duplicate-entity retry
pub const RETRY_SUFFIX_LEN: usize = 4;

/// Default bound of the sent-response history
pub const DEFAULT_HISTORY_LEN: usize = 5;

/// Source of the choices a run makes
pub trait ValueChooser: Send {
    /// Pick an index in `0..len` (`len > 0`)
    fn choose_index(&mut self, len: usize) -> usize;

    /// A string of `len` lowercase alphanumerics
    fn suffix(&mut self, len: usize) -> String;
}

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug)]
pub struct RandomChooser {
    rng: StdRng,
}

impl RandomChooser {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomChooser {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueChooser for RandomChooser {
    fn choose_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }

    fn suffix(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| SUFFIX_ALPHABET[self.rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect()
    }
}

/// Always makes the same choice
#[derive(Debug, Clone)]
pub struct FixedChooser {
    index: usize,
    suffix: String,
}

impl FixedChooser {
    pub fn new(index: usize, suffix: impl Into<String>) -> Self {
        Self {
            index,
            suffix: suffix.into(),
        }
    }
}

impl Default for FixedChooser {
    fn default() -> Self {
        Self::new(0, "test")
    }
}

impl ValueChooser for FixedChooser {
    fn choose_index(&mut self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            self.index % len
        }
    }

    fn suffix(&mut self, len: usize) -> String {
        self.suffix.chars().cycle().take(len).collect()
    }
}

/// A pool of alternative bindings; one entry is bound per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomGroup {
    pub entries: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Randomization {
    /// Variable perturbed when the bot reports a duplicate entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_variable: Option<String>,

    pub groups: Vec<RandomGroup>,
}

impl Randomization {
    /// The pools shipped with the reference rule set
    pub fn reference() -> Self {
        Self {
            groups: reference::reference_pools()
                .into_iter()
                .map(|entries| RandomGroup { entries })
                .collect(),
            retry_variable: Some(reference::RETRY_VARIABLE.to_string()),
        }
    }
}

/// Replace every case-insensitive occurrence of `needle`
fn replace_ignore_case(text: &str, needle: &str, replacement: &str) -> HarnessResult<String> {
    let re = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .map_err(|e| botcheck_common::Error::InvalidPattern {
            pattern: needle.to_string(),
            reason: e.to_string(),
        })?;
    Ok(re.replace_all(text, NoExpand(replacement)).into_owned())
}

/// Mutable state of one scenario run
#[derive(Debug, Clone)]
pub struct RunContext {
    bindings: VariableBindings,
    history: VecDeque<String>,
    history_len: usize,
    retry_spent: bool,
    idle_turns: u32,
    turns: u32,
    log: ConversationLog,
}

impl RunContext {
    pub fn new(bindings: VariableBindings) -> Self {
        Self::with_history_len(bindings, DEFAULT_HISTORY_LEN)
    }

    /// A history length of 0 disables loop detection
    pub fn with_history_len(bindings: VariableBindings, history_len: usize) -> Self {
        Self {
            bindings,
            history: VecDeque::with_capacity(history_len),
            history_len,
            retry_spent: false,
            idle_turns: 0,
            turns: 0,
            log: ConversationLog::new(),
        }
    }

    /// Start a fresh run: defaults restored, history and counters cleared
    pub fn reset(&mut self) {
        self.bindings.reset_to_defaults();
        self.history.clear();
        self.retry_spent = false;
        self.idle_turns = 0;
        self.turns = 0;
        self.log.clear();
    }

    pub fn bindings(&self) -> &VariableBindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut VariableBindings {
        &mut self.bindings
    }

    /// Bind one entry of every pool and rewrite the starter where it still
    /// embeds a default value literally.
    pub fn apply_randomization(
        &mut self,
        randomization: &Randomization,
        chooser: &mut dyn ValueChooser,
        starter: &str,
    ) -> HarnessResult<String> {
        let mut starter = starter.to_string();

        for group in &randomization.groups {
            if group.entries.is_empty() {
                continue;
            }
            let index = chooser.choose_index(group.entries.len()) % group.entries.len();
            let entry = &group.entries[index];

            for (name, value) in entry {
                let default = self.bindings.default_value(name).map(str::to_string);
                self.bindings.set(name, value.clone())?;

                if let Some(default) = default.filter(|d| !d.is_empty() && d != value) {
                    if starter.to_lowercase().contains(&default.to_lowercase()) {
                        starter = replace_ignore_case(&starter, &default, value)?;
                    }
                }
            }
            debug!("Randomized bindings: {:?}", entry);
        }

        Ok(starter)
    }

    /// Record a reply about to be sent; true when the last
    /// `history_len` replies are all identical.
    pub fn record_reply(&mut self, text: &str) -> bool {
        if self.history_len == 0 {
            return false;
        }
        self.history.push_back(text.to_string());
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }
        self.history.len() == self.history_len && self.history.iter().all(|t| t == text)
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn retry_spent(&self) -> bool {
        self.retry_spent
    }

    /// Spend the retry budget and perturb `variable`.
    ///
    /// Returns the previous and the new value.
    pub fn mutate_for_retry(
        &mut self,
        variable: &str,
        chooser: &mut dyn ValueChooser,
    ) -> HarnessResult<(String, String)> {
        self.retry_spent = true;
        let previous = self.bindings.get(variable).unwrap_or_default().to_string();
        let mutated = format!("{}_{}", previous, chooser.suffix(RETRY_SUFFIX_LEN));
        self.bindings.set(variable, mutated.clone())?;
        Ok((previous, mutated))
    }

    /// Spend the retry budget without touching any binding
    pub fn spend_retry(&mut self) {
        self.retry_spent = true;
    }

    /// Count a turn that matched no rule; returns the consecutive total
    pub fn note_idle_turn(&mut self) -> u32 {
        self.idle_turns += 1;
        self.idle_turns
    }

    pub fn clear_idle_turns(&mut self) {
        self.idle_turns = 0;
    }

    pub fn count_turn(&mut self) {
        self.turns += 1;
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ConversationLog {
        &mut self.log
    }

    /// Hand the log over, leaving an empty one
    pub fn take_log(&mut self) -> ConversationLog {
        std::mem::take(&mut self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RunContext {
        RunContext::new(VariableBindings::new(reference::reference_defaults()))
    }

    #[test]
    fn test_loop_detection_needs_full_identical_history() {
        let mut ctx = context();
        for _ in 0..4 {
            assert!(!ctx.record_reply("trigo"));
        }
        assert!(ctx.record_reply("trigo"));

        let mut ctx = context();
        for _ in 0..4 {
            assert!(!ctx.record_reply("trigo"));
        }
        assert!(!ctx.record_reply("cebada"));
        assert_eq!(ctx.history().count(), 5);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut ctx = context();
        for i in 0..12 {
            ctx.record_reply(&i.to_string());
        }
        let kept: Vec<&str> = ctx.history().collect();
        assert_eq!(kept, vec!["7", "8", "9", "10", "11"]);
    }

    #[test]
    fn test_zero_history_never_detects() {
        let mut ctx = RunContext::with_history_len(VariableBindings::default(), 0);
        for _ in 0..10 {
            assert!(!ctx.record_reply("x"));
        }
    }

    #[test]
    fn test_randomization_rewrites_embedded_defaults() {
        let mut ctx = context();
        let mut chooser = FixedChooser::new(2, "abcd");
        let starter = ctx
            .apply_randomization(
                &Randomization::reference(),
                &mut chooser,
                "registra cultivo Trigo de marca GrainMaster",
            )
            .unwrap();

        assert_eq!(starter, "registra cultivo cebada de marca HarvestPlus");
        assert_eq!(ctx.bindings().get("crop_name"), Some("cebada"));
        assert_eq!(ctx.bindings().get("client"), Some("Agrícola San José"));
    }

    /// Always one past the end of the pool
    struct PastTheEnd;

    impl ValueChooser for PastTheEnd {
        fn choose_index(&mut self, len: usize) -> usize {
            len
        }

        fn suffix(&mut self, len: usize) -> String {
            "x".repeat(len)
        }
    }

    #[test]
    fn test_out_of_range_choice_wraps_around() {
        let mut wrapped = context();
        wrapped
            .apply_randomization(&Randomization::reference(), &mut PastTheEnd, "crear cultivo")
            .unwrap();

        let mut first = context();
        first
            .apply_randomization(&Randomization::reference(), &mut FixedChooser::new(0, "x"), "crear cultivo")
            .unwrap();

        assert_eq!(wrapped.bindings().values(), first.bindings().values());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut ctx = context();
        let mut chooser = FixedChooser::new(1, "abcd");
        ctx.apply_randomization(&Randomization::reference(), &mut chooser, "x")
            .unwrap();
        ctx.mutate_for_retry("brand", &mut chooser).unwrap();
        ctx.record_reply("hola");
        ctx.note_idle_turn();
        ctx.log_mut().sent("hola");

        ctx.reset();

        assert_eq!(ctx.bindings().get("crop_name"), Some("trigo"));
        assert_eq!(ctx.bindings().get("brand"), Some("GrainMaster"));
        assert!(!ctx.retry_spent());
        assert_eq!(ctx.history().count(), 0);
        assert_eq!(ctx.note_idle_turn(), 1);
        assert!(ctx.log().is_empty());
    }

    #[test]
    fn test_retry_mutation_appends_suffix() {
        let mut ctx = context();
        let mut chooser = FixedChooser::new(0, "x9");
        let (before, after) = ctx.mutate_for_retry("brand", &mut chooser).unwrap();

        assert_eq!(before, "GrainMaster");
        assert_eq!(after, "GrainMaster_x9x9");
        assert_eq!(ctx.bindings().get("brand"), Some("GrainMaster_x9x9"));
        assert!(ctx.retry_spent());
    }

    #[test]
    fn test_random_chooser_suffix_alphabet() {
        let mut chooser = RandomChooser::seeded(7);
        let suffix = chooser.suffix(RETRY_SUFFIX_LEN);
        assert_eq!(suffix.len(), 4);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(chooser.choose_index(6) < 6);
    }

    #[test]
    fn test_reference_randomization_serializes_to_toml() {
        let randomization = Randomization::reference();
        let text = toml::to_string(&randomization).unwrap();
        let back: Randomization = toml::from_str(&text).unwrap();
        assert_eq!(back, randomization);
    }
}
