//! Heuristic engagement scoring: category, mood, style and a 1–10 relevance
//! score from keyword tables. Pure and deterministic — every probability roll
//! in the system lives in the decision engine, never here.

use crate::config::EngagementConfig;

/// Scoring outcome for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    /// Clamped into [1, 10].
    pub engagement: i32,
    pub category: String,
    pub mood: String,
    /// Style instruction handed to the generation collaborator (and into the
    /// exact-tier cache key).
    pub style: String,
    /// How this category gates probabilistic replies (decision engine step 4).
    pub reply_chance: f64,
    pub trigger_hits: usize,
}

pub struct EngagementScorer {
    config: EngagementConfig,
    triggers: Vec<String>,
}

impl EngagementScorer {
    pub fn new(config: EngagementConfig, trigger_keywords: &[String]) -> Self {
        Self {
            config,
            triggers: trigger_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    /// Number of configured trigger keywords present in `text`.
    pub fn trigger_hits(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        self.triggers
            .iter()
            .filter(|k| !k.is_empty() && lower.contains(k.as_str()))
            .count()
    }

    /// Case-insensitive substring scoring against the configured tables.
    /// The category/mood with the most keyword hits wins; ties go to the
    /// first-listed table, which keeps scores reproducible for a fixed
    /// config file.
    pub fn score(&self, text: &str) -> ScoreBreakdown {
        let lower = text.to_lowercase();

        let mut category: Option<(&str, usize, &str, f64)> = None;
        for table in &self.config.categories {
            let hits = keyword_hits(&lower, &table.keywords);
            if hits > 0 && category.is_none_or(|(_, best, _, _)| hits > best) {
                category = Some((&table.name, hits, &table.style, table.reply_chance));
            }
        }

        let mut mood: Option<(&str, usize)> = None;
        for table in &self.config.moods {
            let hits = keyword_hits(&lower, &table.keywords);
            if hits > 0 && mood.is_none_or(|(_, best)| hits > best) {
                mood = Some((&table.name, hits));
            }
        }

        let (category_name, category_hits, style, reply_chance) = category.unwrap_or((
            self.config.fallback_category.as_str(),
            0,
            "conversational",
            0.0,
        ));
        let mood_name = mood.map_or(self.config.fallback_mood.as_str(), |(name, _)| name);

        let trigger_hits = self.trigger_hits(&lower);
        let combo_bonus = self
            .config
            .combo_bonuses
            .iter()
            .find(|combo| combo.category == category_name && combo.mood == mood_name)
            .map_or(0, |combo| combo.bonus);

        let mut engagement = self.config.base_score;
        engagement += self.config.trigger_bonus * trigger_hits as i32;
        engagement += category_hits.min(3) as i32;
        engagement += combo_bonus;
        if lower.contains('?') {
            engagement += self.config.question_bonus;
        }

        ScoreBreakdown {
            engagement: engagement.clamp(1, 10),
            category: category_name.to_string(),
            mood: mood_name.to_string(),
            style: style.to_string(),
            reply_chance,
            trigger_hits,
        }
    }
}

fn keyword_hits(lower_text: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && lower_text.contains(k.to_lowercase().as_str()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComboBonus, EngagementConfig};

    fn scorer() -> EngagementScorer {
        EngagementScorer::new(
            EngagementConfig::default(),
            &["purrsona".to_string(), "bot".to_string()],
        )
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = scorer();
        let first = scorer.score("why does my rust code not compile?");
        let second = scorer.score("why does my rust code not compile?");
        assert_eq!(first, second);
    }

    #[test]
    fn category_with_most_hits_wins() {
        let scorer = scorer();
        let breakdown = scorer.score("the server threw an error in my rust code");
        assert_eq!(breakdown.category, "technical");
    }

    #[test]
    fn ties_break_to_first_listed_category() {
        let mut config = EngagementConfig::default();
        config.categories[0].keywords = vec!["shared".into()];
        config.categories[1].keywords = vec!["shared".into()];
        let scorer = EngagementScorer::new(config, &[]);
        let breakdown = scorer.score("a shared word");
        assert_eq!(breakdown.category, "technical");
    }

    #[test]
    fn no_hits_falls_back() {
        let scorer = scorer();
        let breakdown = scorer.score("zzz qqq");
        assert_eq!(breakdown.category, "casual");
        assert_eq!(breakdown.mood, "neutral");
        assert_eq!(breakdown.engagement, 3); // base score untouched
    }

    #[test]
    fn trigger_keywords_weigh_heaviest() {
        let scorer = scorer();
        let with_trigger = scorer.score("hey purrsona, what about coffee");
        let without = scorer.score("hey, what about coffee");
        assert!(with_trigger.engagement >= without.engagement + 3);
        assert_eq!(with_trigger.trigger_hits, 1);
    }

    #[test]
    fn question_mark_adds_bonus() {
        let scorer = scorer();
        let question = scorer.score("coffee today?");
        let statement = scorer.score("coffee today");
        assert_eq!(question.engagement, statement.engagement + 1);
    }

    #[test]
    fn combo_bonus_applies() {
        let mut config = EngagementConfig::default();
        config.combo_bonuses = vec![ComboBonus {
            category: "technical".into(),
            mood: "negative".into(),
            bonus: 2,
        }];
        let scorer = EngagementScorer::new(config, &[]);
        let with_combo = scorer.score("ugh this code bug");
        let plain = scorer.score("this code bug");
        assert_eq!(with_combo.mood, "negative");
        assert_eq!(with_combo.engagement, plain.engagement + 2);
    }

    #[test]
    fn score_is_clamped_to_ten() {
        let scorer = scorer();
        let breakdown = scorer
            .score("purrsona bot purrsona rust code bug error compile deploy api server???");
        assert_eq!(breakdown.engagement, 10);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let scorer = scorer();
        let breakdown = scorer.score("RUST CODE BUG");
        assert_eq!(breakdown.category, "technical");
    }
}
