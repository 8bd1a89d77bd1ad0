use crate::error::BotError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    pub api_key: Option<String>,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub gating: GatingConfig,

    #[serde(default)]
    pub engagement: EngagementConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

// ── Persona ───────────────────────────────────────────────────────

/// Who the bot is and the substrings that count as addressing it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    /// Substrings treated as a direct address — they bypass probability gates.
    #[serde(default = "default_trigger_keywords")]
    pub trigger_keywords: Vec<String>,
    /// Scripted replies used to calm a spamming conversation down.
    #[serde(default = "default_deescalation_replies")]
    pub deescalation_replies: Vec<String>,
    /// Short apologies emitted (with small probability) when generation fails.
    #[serde(default = "default_apology_replies")]
    pub apology_replies: Vec<String>,
}

fn default_persona_name() -> String {
    "purrsona".into()
}

fn default_trigger_keywords() -> Vec<String> {
    vec!["purrsona".into(), "bot".into()]
}

fn default_deescalation_replies() -> Vec<String> {
    vec![
        "whoa, one at a time please".into(),
        "let's slow down a little".into(),
    ]
}

fn default_apology_replies() -> Vec<String> {
    vec!["sorry, lost my train of thought — try me again in a bit".into()]
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            trigger_keywords: default_trigger_keywords(),
            deescalation_replies: default_deescalation_replies(),
            apology_replies: default_apology_replies(),
        }
    }
}

// ── Gating ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingConfig {
    #[serde(default = "default_rate_per_conversation")]
    pub rate_per_conversation_per_minute: usize,
    #[serde(default = "default_rate_global")]
    pub rate_global_per_minute: usize,
    #[serde(default = "default_spam_threshold")]
    pub spam_threshold_per_minute: usize,
    #[serde(default = "default_spam_cooldown_secs")]
    pub spam_cooldown_secs: u64,
    #[serde(default = "default_max_replies_per_hour")]
    pub max_replies_per_hour: usize,
    #[serde(default = "default_min_silence_minutes")]
    pub min_silence_minutes: u64,
    /// Whether the bot may speak unprompted on a periodic tick.
    #[serde(default)]
    pub autonomous_enabled: bool,
    #[serde(default = "default_spontaneous_chance")]
    pub spontaneous_chance: f64,
    #[serde(default = "default_spam_reply_chance")]
    pub spam_reply_chance: f64,
    #[serde(default = "default_spontaneous_tick_secs")]
    pub spontaneous_tick_secs: u64,
    /// Errors per 5 minutes before the conversation goes fully silent.
    #[serde(default = "default_error_suppression_threshold")]
    pub error_suppression_threshold: usize,
    #[serde(default = "default_apology_chance")]
    pub apology_chance: f64,
}

fn default_rate_per_conversation() -> usize {
    6
}
fn default_rate_global() -> usize {
    60
}
fn default_spam_threshold() -> usize {
    5
}
fn default_spam_cooldown_secs() -> u64 {
    120
}
fn default_max_replies_per_hour() -> usize {
    30
}
fn default_min_silence_minutes() -> u64 {
    45
}
fn default_spontaneous_chance() -> f64 {
    0.15
}
fn default_spam_reply_chance() -> f64 {
    0.25
}
fn default_spontaneous_tick_secs() -> u64 {
    300
}
fn default_error_suppression_threshold() -> usize {
    3
}
fn default_apology_chance() -> f64 {
    0.2
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            rate_per_conversation_per_minute: default_rate_per_conversation(),
            rate_global_per_minute: default_rate_global(),
            spam_threshold_per_minute: default_spam_threshold(),
            spam_cooldown_secs: default_spam_cooldown_secs(),
            max_replies_per_hour: default_max_replies_per_hour(),
            min_silence_minutes: default_min_silence_minutes(),
            autonomous_enabled: false,
            spontaneous_chance: default_spontaneous_chance(),
            spam_reply_chance: default_spam_reply_chance(),
            spontaneous_tick_secs: default_spontaneous_tick_secs(),
            error_suppression_threshold: default_error_suppression_threshold(),
            apology_chance: default_apology_chance(),
        }
    }
}

// ── Engagement scoring ────────────────────────────────────────────

/// One conversation category: keywords that vote for it, the style
/// instruction it implies, and the reply probability for high-engagement
/// messages that match it. First-listed category wins ties — keep the
/// ordering stable for reproducible scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTable {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default = "default_category_style")]
    pub style: String,
    #[serde(default = "default_reply_chance")]
    pub reply_chance: f64,
}

fn default_category_style() -> String {
    "conversational".into()
}
fn default_reply_chance() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodTable {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Extra engagement points for a specific category × mood pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboBonus {
    pub category: String,
    pub mood: String,
    pub bonus: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    #[serde(default = "default_base_score")]
    pub base_score: i32,
    /// Per matched trigger keyword. Heavier than any category bonus.
    #[serde(default = "default_trigger_bonus")]
    pub trigger_bonus: i32,
    #[serde(default = "default_question_bonus")]
    pub question_bonus: i32,
    /// Engagement at or above this enters the probabilistic reply gate.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: i32,
    #[serde(default = "default_categories")]
    pub categories: Vec<KeywordTable>,
    #[serde(default = "default_moods")]
    pub moods: Vec<MoodTable>,
    #[serde(default = "default_combo_bonuses")]
    pub combo_bonuses: Vec<ComboBonus>,
    /// Category reported when nothing matches.
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    #[serde(default = "default_fallback_mood")]
    pub fallback_mood: String,
}

fn default_base_score() -> i32 {
    3
}
fn default_trigger_bonus() -> i32 {
    3
}
fn default_question_bonus() -> i32 {
    1
}
fn default_high_threshold() -> i32 {
    7
}
fn default_fallback_category() -> String {
    "casual".into()
}
fn default_fallback_mood() -> String {
    "neutral".into()
}

fn default_categories() -> Vec<KeywordTable> {
    vec![
        KeywordTable {
            name: "technical".into(),
            keywords: ["code", "bug", "rust", "compile", "server", "error", "deploy", "api"]
                .map(String::from)
                .to_vec(),
            style: "precise and to the point".into(),
            reply_chance: 0.8,
        },
        KeywordTable {
            name: "philosophical".into(),
            keywords: ["meaning", "consciousness", "believe", "ethics", "why do we"]
                .map(String::from)
                .to_vec(),
            style: "thoughtful, a little playful".into(),
            reply_chance: 0.6,
        },
        KeywordTable {
            name: "casual".into(),
            keywords: ["lol", "haha", "weekend", "coffee", "food", "game"]
                .map(String::from)
                .to_vec(),
            style: "light and informal".into(),
            reply_chance: 0.4,
        },
        KeywordTable {
            name: "conflict".into(),
            keywords: ["stupid", "hate", "shut up", "wrong", "annoying"]
                .map(String::from)
                .to_vec(),
            style: "calm and de-escalating".into(),
            reply_chance: 0.3,
        },
    ]
}

fn default_moods() -> Vec<MoodTable> {
    vec![
        MoodTable {
            name: "positive".into(),
            keywords: ["great", "love", "thanks", "awesome", "nice", ":)"]
                .map(String::from)
                .to_vec(),
        },
        MoodTable {
            name: "negative".into(),
            keywords: ["sad", "tired", "hate", "worst", "ugh", ":("]
                .map(String::from)
                .to_vec(),
        },
        MoodTable {
            name: "energetic".into(),
            keywords: ["!!", "let's go", "hype", "now", "quick"]
                .map(String::from)
                .to_vec(),
        },
    ]
}

fn default_combo_bonuses() -> Vec<ComboBonus> {
    vec![
        ComboBonus {
            category: "technical".into(),
            mood: "negative".into(),
            bonus: 2,
        },
        ComboBonus {
            category: "philosophical".into(),
            mood: "positive".into(),
            bonus: 1,
        },
        ComboBonus {
            category: "conflict".into(),
            mood: "negative".into(),
            bonus: 2,
        },
    ]
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            trigger_bonus: default_trigger_bonus(),
            question_bonus: default_question_bonus(),
            high_threshold: default_high_threshold(),
            categories: default_categories(),
            moods: default_moods(),
            combo_bonuses: default_combo_bonuses(),
            fallback_category: default_fallback_category(),
            fallback_mood: default_fallback_mood(),
        }
    }
}

// ── Context budgeting ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,
    /// Estimated tokens per character for Latin-script text.
    #[serde(default = "default_tokens_per_char")]
    pub tokens_per_char: f64,
    /// Estimated tokens per character when a non-Latin script dominates.
    #[serde(default = "default_dense_tokens_per_char")]
    pub dense_tokens_per_char: f64,
    /// Applied when the text looks technical (URLs, code punctuation).
    #[serde(default = "default_technical_multiplier")]
    pub technical_multiplier: f64,
    /// Flat token addend per emoji or symbol character.
    #[serde(default = "default_symbol_token_cost")]
    pub symbol_token_cost: u32,
    /// A message this long or longer counts as important on its own.
    #[serde(default = "default_important_length")]
    pub important_length: usize,
    /// Cap on important entries kept when compressing.
    #[serde(default = "default_max_important_entries")]
    pub max_important_entries: usize,
    /// Recent turns remembered per conversation for context assembly.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_token_budget() -> u32 {
    4000
}
fn default_tokens_per_char() -> f64 {
    0.25
}
fn default_dense_tokens_per_char() -> f64 {
    0.7
}
fn default_technical_multiplier() -> f64 {
    1.3
}
fn default_symbol_token_cost() -> u32 {
    2
}
fn default_important_length() -> usize {
    240
}
fn default_max_important_entries() -> usize {
    12
}
fn default_history_turns() -> usize {
    50
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            tokens_per_char: default_tokens_per_char(),
            dense_tokens_per_char: default_dense_tokens_per_char(),
            technical_multiplier: default_technical_multiplier(),
            symbol_token_cost: default_symbol_token_cost(),
            important_length: default_important_length(),
            max_important_entries: default_max_important_entries(),
            history_turns: default_history_turns(),
        }
    }
}

// ── Response cache ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_hours")]
    pub ttl_hours: u32,
    #[serde(default = "default_similarity_threshold")]
    pub semantic_similarity_threshold: f64,
    /// Keywords kept per prompt in the semantic tier.
    #[serde(default = "default_keyword_top_n")]
    pub keyword_top_n: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_hours() -> u32 {
    6
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_keyword_top_n() -> usize {
    8
}
fn default_sweep_interval_secs() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_hours: default_cache_ttl_hours(),
            semantic_similarity_threshold: default_similarity_threshold(),
            keyword_top_n: default_keyword_top_n(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_generation_retries")]
    pub generation_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub generation_backoff_ms: u64,
    /// Per-key entries kept before LRU eviction in each state store.
    #[serde(default = "default_state_capacity")]
    pub state_capacity: usize,
    #[serde(default = "default_state_sweep_interval_secs")]
    pub state_sweep_interval_secs: u64,
    #[serde(default = "default_channel_initial_backoff_secs")]
    pub channel_initial_backoff_secs: u64,
    #[serde(default = "default_channel_max_backoff_secs")]
    pub channel_max_backoff_secs: u64,
}

fn default_generation_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_state_capacity() -> usize {
    4096
}
fn default_state_sweep_interval_secs() -> u64 {
    900
}
fn default_channel_initial_backoff_secs() -> u64 {
    2
}
fn default_channel_max_backoff_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            generation_retries: default_generation_retries(),
            generation_backoff_ms: default_backoff_ms(),
            state_capacity: default_state_capacity(),
            state_sweep_interval_secs: default_state_sweep_interval_secs(),
            channel_initial_backoff_secs: default_channel_initial_backoff_secs(),
            channel_max_backoff_secs: default_channel_max_backoff_secs(),
        }
    }
}

// ── Generation collaborator ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f64 {
    0.8
}
fn default_max_output_chars() -> usize {
    1200
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let purrsona_dir = home.join(".purrsona");

        Self {
            workspace_dir: purrsona_dir.join("workspace"),
            config_path: purrsona_dir.join("config.toml"),
            api_key: None,
            persona: PersonaConfig::default(),
            gating: GatingConfig::default(),
            engagement: EngagementConfig::default(),
            context: ContextConfig::default(),
            cache: CacheConfig::default(),
            reliability: ReliabilityConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let purrsona_dir = home.join(".purrsona");
        let config_path = purrsona_dir.join("config.toml");

        if !purrsona_dir.exists() {
            fs::create_dir_all(&purrsona_dir).context("Failed to create .purrsona directory")?;
            fs::create_dir_all(purrsona_dir.join("workspace"))
                .context("Failed to create workspace directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            let serialized =
                toml::to_string_pretty(&config).context("Failed to serialize default config")?;
            fs::write(&config_path, serialized).context("Failed to write default config")?;
            config
        };

        // Computed paths are skipped during serialization
        config.config_path = config_path;
        config.workspace_dir = purrsona_dir.join("workspace");
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PURRSONA_API_KEY").or_else(|_| std::env::var("API_KEY")) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("PURRSONA_MODEL") {
            if !model.is_empty() {
                self.generator.model = model;
            }
        }
        if let Ok(workspace) = std::env::var("PURRSONA_WORKSPACE") {
            if !workspace.is_empty() {
                self.workspace_dir = PathBuf::from(workspace);
            }
        }
    }

    /// Fail fast on out-of-range thresholds, before any traffic is accepted.
    pub fn validate(&self) -> std::result::Result<(), BotError> {
        fn chance(name: &str, value: f64) -> std::result::Result<(), BotError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(BotError::config(format!(
                    "{name} must be within 0..=1, got {value}"
                )))
            }
        }

        if self.gating.rate_per_conversation_per_minute == 0 {
            return Err(BotError::config(
                "gating.rate_per_conversation_per_minute must be at least 1",
            ));
        }
        if self.gating.rate_global_per_minute < self.gating.rate_per_conversation_per_minute {
            return Err(BotError::config(
                "gating.rate_global_per_minute must be >= the per-conversation rate",
            ));
        }
        if self.gating.spam_threshold_per_minute == 0 {
            return Err(BotError::config(
                "gating.spam_threshold_per_minute must be at least 1",
            ));
        }
        if self.gating.max_replies_per_hour == 0 {
            return Err(BotError::config(
                "gating.max_replies_per_hour must be at least 1",
            ));
        }
        chance("gating.spontaneous_chance", self.gating.spontaneous_chance)?;
        chance("gating.spam_reply_chance", self.gating.spam_reply_chance)?;
        chance("gating.apology_chance", self.gating.apology_chance)?;
        chance(
            "cache.semantic_similarity_threshold",
            self.cache.semantic_similarity_threshold,
        )?;
        for table in &self.engagement.categories {
            chance(
                &format!("engagement category '{}' reply_chance", table.name),
                table.reply_chance,
            )?;
        }
        if !(1..=10).contains(&self.engagement.high_threshold) {
            return Err(BotError::config(
                "engagement.high_threshold must be within 1..=10",
            ));
        }
        if self.context.token_budget == 0 {
            return Err(BotError::config("context.token_budget must be positive"));
        }
        if self.context.tokens_per_char <= 0.0 || self.context.dense_tokens_per_char <= 0.0 {
            return Err(BotError::config(
                "context tokens-per-char ratios must be positive",
            ));
        }
        if self.reliability.state_capacity == 0 {
            return Err(BotError::config(
                "reliability.state_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
