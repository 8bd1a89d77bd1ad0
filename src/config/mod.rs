mod schema;

pub use schema::{
    CacheConfig, ComboBonus, Config, ContextConfig, EngagementConfig, GatingConfig,
    GeneratorConfig, KeywordTable, MoodTable, PersonaConfig, ReliabilityConfig,
};
