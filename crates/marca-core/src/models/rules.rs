//! Field rules and rule sets.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RuleValidationError;

/// Default render scale of the marking canvas.
pub const DEFAULT_RENDER_SCALE: f32 = 1.5;

/// Slack for regions drawn flush against the page edge.
const BOUNDS_EPSILON: f32 = 1e-4;

/// A rectangle drawn by the operator on a rendered page.
///
/// Coordinates are relative to the rendered page image (origin top-left),
/// so they stay valid at any zoom level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedRegion {
    /// Field this region feeds.
    pub field_name: String,
    /// Left edge in [0, 1].
    pub x: f32,
    /// Top edge in [0, 1].
    pub y: f32,
    /// Width in [0, 1].
    pub width: f32,
    /// Height in [0, 1].
    pub height: f32,
    /// Page number (1-indexed).
    pub page_number: u32,
    /// Scale the page was rendered at when the region was drawn.
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,
}

fn default_render_scale() -> f32 {
    DEFAULT_RENDER_SCALE
}

impl MarkedRegion {
    pub fn new(field_name: impl Into<String>, page_number: u32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            field_name: field_name.into(),
            x,
            y,
            width,
            height,
            page_number,
            render_scale: DEFAULT_RENDER_SCALE,
        }
    }

    /// Record the scale the region was drawn at.
    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    /// Build from a rectangle drawn in canvas pixels.
    ///
    /// Dragging up or left yields a negative size; the corners are
    /// normalized first.
    pub fn from_canvas(
        field_name: impl Into<String>,
        page_number: u32,
        start: (f32, f32),
        end: (f32, f32),
        canvas_width: f32,
        canvas_height: f32,
    ) -> Self {
        let left = start.0.min(end.0);
        let top = start.1.min(end.1);
        let width = (start.0 - end.0).abs();
        let height = (start.1 - end.1).abs();

        Self::new(
            field_name,
            page_number,
            left / canvas_width,
            top / canvas_height,
            width / canvas_width,
            height / canvas_height,
        )
    }

    /// Positive, finite width and height.
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Whole region lies within the unit square.
    pub fn within_page(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.x >= -BOUNDS_EPSILON
            && self.y >= -BOUNDS_EPSILON
            && self.x + self.width <= 1.0 + BOUNDS_EPSILON
            && self.y + self.height <= 1.0 + BOUNDS_EPSILON
    }
}

/// A named field bound to one region of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field_name: String,
    pub region: MarkedRegion,
}

impl FieldRule {
    pub fn new(region: MarkedRegion) -> Self {
        Self {
            field_name: region.field_name.clone(),
            region,
        }
    }

    /// Check this rule against the template's page count.
    pub fn validate(&self, page_count: u32) -> Result<(), RuleValidationError> {
        if self.field_name.trim().is_empty() {
            return Err(RuleValidationError::EmptyFieldName);
        }

        let region = &self.region;
        if !region.has_area() {
            return Err(RuleValidationError::EmptyRegion {
                field: self.field_name.clone(),
                width: region.width,
                height: region.height,
            });
        }
        if !region.within_page() {
            return Err(RuleValidationError::OutOfBounds {
                field: self.field_name.clone(),
            });
        }
        if !region.render_scale.is_finite() || region.render_scale <= 0.0 {
            return Err(RuleValidationError::InvalidRenderScale {
                field: self.field_name.clone(),
                scale: region.render_scale,
            });
        }
        if region.page_number == 0 || region.page_number > page_count {
            return Err(RuleValidationError::PageOutOfRange {
                field: self.field_name.clone(),
                page: region.page_number,
                page_count,
            });
        }

        Ok(())
    }
}

/// The field rules defined for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Template identifier (e.g. an organization code).
    pub template_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of pages documents of this template have.
    pub page_count: u32,
    /// Field rules.
    #[serde(default)]
    pub rules: Vec<FieldRule>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RuleSet {
    pub fn new(template_id: impl Into<String>, page_count: u32) -> Self {
        Self {
            template_id: template_id.into(),
            name: None,
            page_count,
            rules: Vec::new(),
            updated_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a rule, replacing any existing rule for the same field.
    pub fn add_rule(&mut self, rule: FieldRule) {
        match self.rules.iter_mut().find(|r| r.field_name == rule.field_name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self.touch();
    }

    /// Remove the rule for a field. Returns whether one existed.
    pub fn remove_rule(&mut self, field_name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.field_name != field_name);
        let removed = self.rules.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn rule(&self, field_name: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.field_name == field_name)
    }

    /// Mark the rule set as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Split into usable rules and per-field errors.
    ///
    /// A bad rule never blocks the valid ones.
    pub fn validate(&self) -> ValidatedRuleSet {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        let mut errors = Vec::new();

        for rule in &self.rules {
            if let Err(e) = rule.validate(self.page_count) {
                errors.push(e);
                continue;
            }
            if !seen.insert(rule.field_name.as_str()) {
                errors.push(RuleValidationError::DuplicateField {
                    field: rule.field_name.clone(),
                });
                continue;
            }
            rules.push(rule.clone());
        }

        ValidatedRuleSet {
            template_id: self.template_id.clone(),
            page_count: self.page_count,
            rules,
            errors,
        }
    }
}

/// A rule set snapshot ready for extraction.
///
/// Edits to the source [`RuleSet`] after validation are not observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRuleSet {
    pub template_id: String,
    pub page_count: u32,
    pub rules: Vec<FieldRule>,
    pub errors: Vec<RuleValidationError>,
}

impl ValidatedRuleSet {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(field: &str, page: u32, width: f32) -> FieldRule {
        FieldRule::new(MarkedRegion::new(field, page, 0.1, 0.1, width, 0.05))
    }

    #[test]
    fn test_zero_width_rejected() {
        let err = rule("CATEGORIA", 1, 0.0).validate(2).unwrap_err();
        assert_eq!(
            err,
            RuleValidationError::EmptyRegion {
                field: "CATEGORIA".to_string(),
                width: 0.0,
                height: 0.05,
            }
        );
    }

    #[test]
    fn test_page_out_of_range() {
        assert!(matches!(
            rule("NOMBRE", 3, 0.2).validate(2),
            Err(RuleValidationError::PageOutOfRange { page: 3, page_count: 2, .. })
        ));
        assert!(matches!(
            rule("NOMBRE", 0, 0.2).validate(2),
            Err(RuleValidationError::PageOutOfRange { page: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let region = MarkedRegion::new("NOMBRE", 1, 0.9, 0.1, 0.2, 0.05);
        assert!(matches!(
            FieldRule::new(region).validate(1),
            Err(RuleValidationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_bad_render_scale_rejected() {
        for scale in [0.0, -1.5, f32::NAN, f32::INFINITY] {
            let region = MarkedRegion::new("NOMBRE", 1, 0.1, 0.1, 0.2, 0.05).with_render_scale(scale);
            assert!(matches!(
                FieldRule::new(region).validate(1),
                Err(RuleValidationError::InvalidRenderScale { .. })
            ));
        }

        let region = MarkedRegion::new("NOMBRE", 1, 0.1, 0.1, 0.2, 0.05).with_render_scale(0.5);
        assert!(FieldRule::new(region).validate(1).is_ok());
    }

    #[test]
    fn test_validate_keeps_good_rules() {
        let mut set = RuleSet::new("ORG-01", 2);
        set.rules.push(rule("NOMBRE", 1, 0.2));
        set.rules.push(rule("CATEGORIA", 1, 0.0));
        set.rules.push(rule("CEDULA", 2, 0.2));
        set.rules.push(rule("NOMBRE", 2, 0.3));

        let validated = set.validate();

        let names: Vec<&str> = validated.rules.iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["NOMBRE", "CEDULA"]);
        assert_eq!(validated.errors.len(), 2);
        assert_eq!(validated.errors[0].field(), Some("CATEGORIA"));
        assert_eq!(
            validated.errors[1],
            RuleValidationError::DuplicateField {
                field: "NOMBRE".to_string()
            }
        );
        assert!(!validated.is_clean());
    }

    #[test]
    fn test_add_rule_replaces_field() {
        let mut set = RuleSet::new("ORG-01", 1);
        set.add_rule(rule("NOMBRE", 1, 0.2));
        set.add_rule(rule("NOMBRE", 1, 0.4));

        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rule("NOMBRE").unwrap().region.width, 0.4);
        assert!(set.updated_at.is_some());
        assert!(set.remove_rule("NOMBRE"));
        assert!(!set.remove_rule("NOMBRE"));
    }

    #[test]
    fn test_from_canvas_normalizes_drag_direction() {
        let region = MarkedRegion::from_canvas("NOMBRE", 1, (300.0, 200.0), (100.0, 100.0), 1000.0, 2000.0);
        assert_eq!(region.x, 0.1);
        assert_eq!(region.y, 0.05);
        assert_eq!(region.width, 0.2);
        assert_eq!(region.height, 0.05);
    }

    #[test]
    fn test_render_scale_defaults_when_missing() {
        let json = r#"{"field_name":"NOMBRE","x":0.1,"y":0.2,"width":0.3,"height":0.05,"page_number":1}"#;
        let region: MarkedRegion = serde_json::from_str(json).unwrap();
        assert_eq!(region.render_scale, DEFAULT_RENDER_SCALE);
    }
}
