//! Per-architecture weekday schedules for recipe templates.
//!
//! A schedule such as `"i386: 1; s390x: 2; x86_64: 5,6,0"` runs each
//! architecture only on the listed weekdays, while `"x86_64: !5"` runs
//! x86_64 every day except Friday. Weekdays count from 0 (Sunday) to 6.

use chrono::{Datelike, Local};
use serde::Serialize;

use crate::error::{Result, TrackerError};

/// One architecture/weekday directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleRule {
    pub arch: String,
    /// `true` runs on `weekday`, `false` runs on every other day
    pub include: bool,
    pub weekday: u8,
}

impl ScheduleRule {
    fn selects(&self, weekday: u8) -> bool {
        (self.include && self.weekday == weekday) || (!self.include && self.weekday != weekday)
    }
}

/// Parses a schedule expression into one rule per listed weekday.
///
/// # Errors
///
/// Rejects the whole expression if any rule lacks its `:` separator or
/// lists something other than a weekday number 0-6.
pub fn parse_schedule(expression: &str) -> Result<Vec<ScheduleRule>> {
    let mut rules = Vec::new();

    for segment in expression.split(';') {
        if segment.trim().is_empty() {
            continue;
        }

        let Some((arch, values)) = segment.split_once(':') else {
            return Err(TrackerError::Schedule(segment.trim().to_string()));
        };
        if values.contains(':') {
            return Err(TrackerError::Schedule(segment.trim().to_string()));
        }

        let arch = arch.trim();
        let values = values.trim();
        let (include, values) = match values.strip_prefix('!') {
            Some(rest) => (false, rest),
            None => (true, values),
        };

        for value in values.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            let weekday = value
                .parse::<u8>()
                .ok()
                .filter(|day| *day <= 6)
                .ok_or_else(|| {
                    TrackerError::Schedule(format!("invalid weekday '{value}' in '{}'", segment.trim()))
                })?;

            rules.push(ScheduleRule {
                arch: arch.to_string(),
                include,
                weekday,
            });
        }
    }

    Ok(rules)
}

/// Architectures selected on `weekday`, in first-match order.
///
/// Falls back to every declared architecture when no rule selects any.
pub fn archs_for_weekday(rules: &[ScheduleRule], weekday: u8, declared: &[String]) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();

    for rule in rules.iter().filter(|rule| rule.selects(weekday)) {
        if !selected.contains(&rule.arch) {
            selected.push(rule.arch.clone());
        }
    }

    if selected.is_empty() {
        return declared.to_vec();
    }
    selected
}

/// Architectures picked for one weekday, with the rules that picked them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchSelection {
    pub weekday: u8,
    pub rules: Vec<ScheduleRule>,
    pub archs: Vec<String>,
    /// True when no rule selected anything and every declared arch runs
    pub fallback: bool,
}

/// Parses `expression` and selects the architectures for `weekday`.
///
/// # Errors
///
/// Returns [`TrackerError::Schedule`] for a malformed expression or a
/// weekday outside 0-6.
pub fn select(expression: &str, weekday: u8, declared: &[String]) -> Result<ArchSelection> {
    if weekday > 6 {
        return Err(TrackerError::Schedule(format!("invalid weekday '{weekday}'")));
    }

    let rules = parse_schedule(expression)?;
    let fallback = !rules.iter().any(|rule| rule.selects(weekday));
    let archs = archs_for_weekday(&rules, weekday, declared);

    Ok(ArchSelection {
        weekday,
        rules,
        archs,
        fallback,
    })
}

/// Local weekday, 0 = Sunday.
pub fn today() -> u8 {
    #[allow(clippy::cast_possible_truncation)]
    let weekday = Local::now().weekday().num_days_from_sunday() as u8;
    weekday
}
