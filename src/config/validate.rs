// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    CommandConfig, ConfigFile, InterviewSection, InterviewSettings, PipelineSection,
    PipelineSettings, RawConfigFile,
};
use crate::errors::{DiligenceError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DiligenceError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let pipeline = resolve_pipeline(&raw.pipeline)?;
        let interview = resolve_interview(&raw.interview)?;
        validate_collaborators(&raw)?;
        Ok(ConfigFile::new_unchecked(
            pipeline,
            interview,
            raw.collaborators,
        ))
    }
}

fn resolve_pipeline(section: &PipelineSection) -> Result<PipelineSettings> {
    if section.max_width == 0 {
        return Err(DiligenceError::ConfigError(
            "[pipeline].max_width must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(PipelineSettings {
        max_width: section.max_width,
        task_timeout: duration_field("pipeline", "task_timeout", &section.task_timeout)?,
        max_retries: section.max_retries,
        retry_base_delay: duration_field(
            "pipeline",
            "retry_base_delay",
            &section.retry_base_delay,
        )?,
        cancel_grace: duration_field("pipeline", "cancel_grace", &section.cancel_grace)?,
    })
}

fn resolve_interview(section: &InterviewSection) -> Result<InterviewSettings> {
    if section.max_questions == 0 {
        return Err(DiligenceError::ConfigError(
            "[interview].max_questions must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.min_questions > section.max_questions {
        return Err(DiligenceError::ConfigError(format!(
            "[interview].min_questions ({}) exceeds max_questions ({})",
            section.min_questions, section.max_questions
        )));
    }

    Ok(InterviewSettings {
        max_followups: section.max_followups,
        min_questions: section.min_questions,
        max_questions: section.max_questions,
        evaluation_timeout: duration_field(
            "interview",
            "evaluation_timeout",
            &section.evaluation_timeout,
        )?,
    })
}

fn validate_collaborators(cfg: &RawConfigFile) -> Result<()> {
    let collaborators = &cfg.collaborators;

    if collaborators.generate.is_none() {
        return Err(DiligenceError::ConfigError(
            "config must contain a [collaborators.generate] section".to_string(),
        ));
    }

    let named = [
        ("generate", collaborators.generate.as_ref()),
        ("search", collaborators.search.as_ref()),
        ("evaluate", collaborators.evaluate.as_ref()),
    ];
    for (name, command) in named {
        if let Some(CommandConfig { cmd, .. }) = command {
            if cmd.trim().is_empty() {
                return Err(DiligenceError::ConfigError(format!(
                    "[collaborators.{name}].cmd must not be empty"
                )));
            }
        }
    }

    Ok(())
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| {
        DiligenceError::ConfigError(format!("[{section}].{field}: {e}"))
    })
}

/// Parse durations like `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::CollaboratorsSection;

    fn raw_with_generate() -> RawConfigFile {
        RawConfigFile {
            collaborators: CollaboratorsSection {
                generate: Some(CommandConfig::new("cat")),
                ..CollaboratorsSection::default()
            },
            ..RawConfigFile::default()
        }
    }

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 30s "), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn rejects_overflowing_durations() {
        let huge = format!("{}h", u64::MAX / 60);
        let err = parse_duration(&huge).unwrap_err();
        assert!(err.contains("too large"));
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)),
            Ok(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn defaults_resolve() {
        let cfg = ConfigFile::try_from(raw_with_generate()).expect("defaults are valid");
        assert_eq!(cfg.pipeline, PipelineSettings::default());
        assert_eq!(cfg.interview, InterviewSettings::default());
    }

    #[test]
    fn zero_width_is_rejected() {
        let mut raw = raw_with_generate();
        raw.pipeline.max_width = 0;
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, DiligenceError::ConfigError(msg) if msg.contains("max_width")));
    }

    #[test]
    fn inverted_question_bounds_are_rejected() {
        let mut raw = raw_with_generate();
        raw.interview.min_questions = 8;
        assert!(ConfigFile::try_from(raw).is_err());
    }

    #[test]
    fn blank_collaborator_command_is_rejected() {
        let mut raw = raw_with_generate();
        raw.collaborators.search = Some(CommandConfig::new("   "));
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, DiligenceError::ConfigError(msg) if msg.contains("search")));
    }
}
