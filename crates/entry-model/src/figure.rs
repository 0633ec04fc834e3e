//! Entry and figure payloads

use crate::ids::ServerId;
use crate::record::{ChildPayload, LinkedOption, OptionKind, ParentPayload};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference to a lookup entity (organization, tag, event, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedEntity {
    /// Entity id
    pub id: ServerId,
    /// Display name
    pub name: String,
}

impl LinkedEntity {
    /// Create a new reference
    pub fn new(id: impl Into<ServerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    fn as_option(&self, kind: OptionKind) -> LinkedOption {
        LinkedOption::new(kind, self.id.clone(), self.name.clone())
    }
}

/// Role of a figure in the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FigureRole {
    /// Used for the headline figure
    #[default]
    Recommended,
    /// Used to cross-check other figures
    Triangulation,
}

/// How the reported number should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quantifier {
    /// More than the reported number
    MoreThan,
    /// Less than the reported number
    LessThan,
    /// Exactly the reported number
    #[default]
    Exact,
    /// Approximately the reported number
    Approximately,
}

/// Unit of the reported number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FigureUnit {
    /// People
    #[default]
    Person,
    /// Households, converted with the household size
    Household,
}

/// One quantified displacement statistic
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Figure {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,
    /// Parent entry
    #[serde(default)]
    pub entry: Option<ServerId>,
    /// Event the figure belongs to
    #[serde(default)]
    pub event: Option<LinkedEntity>,
    /// ISO3 country code
    #[serde(default)]
    pub country: Option<String>,
    /// Role in the entry
    #[serde(default)]
    pub role: FigureRole,
    /// Quantifier
    #[serde(default)]
    pub quantifier: Quantifier,
    /// Reported number
    #[serde(default)]
    pub reported: Option<u64>,
    /// Unit of the reported number
    #[serde(default)]
    pub unit: FigureUnit,
    /// People per household
    #[serde(default)]
    pub household_size: Option<f64>,
    /// Displacement term
    #[serde(default)]
    pub term: Option<String>,
    /// Figure category
    #[serde(default)]
    pub category: Option<String>,
    /// Start of the covered period
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// End of the covered period
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Included in the internal displacement updates
    #[serde(default)]
    pub include_idu: bool,
    /// Source organizations
    #[serde(default)]
    pub sources: Vec<LinkedEntity>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<LinkedEntity>,
    /// Contexts of violence
    #[serde(default)]
    pub context_of_violence: Vec<LinkedEntity>,
}

impl Figure {
    /// New figure for a country
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            ..Self::default()
        }
    }

    /// With reported number
    #[must_use]
    pub fn with_reported(mut self, reported: u64) -> Self {
        self.reported = Some(reported);
        self
    }

    /// With server id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ServerId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// With event
    #[must_use]
    pub fn with_event(mut self, event: LinkedEntity) -> Self {
        self.event = Some(event);
        self
    }

    /// With household unit
    #[must_use]
    pub fn in_households(mut self, household_size: f64) -> Self {
        self.unit = FigureUnit::Household;
        self.household_size = Some(household_size);
        self
    }

    /// Number of people this figure stands for
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn total(&self) -> Option<u64> {
        let reported = self.reported?;
        match self.unit {
            FigureUnit::Person => Some(reported),
            FigureUnit::Household => {
                let size = self.household_size?;
                Some((reported as f64 * size).round() as u64)
            }
        }
    }
}

impl ChildPayload for Figure {
    fn server_id(&self) -> Option<&ServerId> {
        self.id.as_ref()
    }

    fn clear_server_id(&mut self) {
        self.id = None;
    }

    fn attach_parent(&mut self, parent: &ServerId) {
        self.entry = Some(parent.clone());
    }

    fn linked_options(&self) -> Vec<LinkedOption> {
        let mut options = Vec::new();
        options.extend(
            self.sources
                .iter()
                .map(|s| s.as_option(OptionKind::Organization)),
        );
        options.extend(self.tags.iter().map(|t| t.as_option(OptionKind::Tag)));
        options.extend(
            self.context_of_violence
                .iter()
                .map(|c| c.as_option(OptionKind::ContextOfViolence)),
        );
        if let Some(event) = &self.event {
            options.push(event.as_option(OptionKind::Event));
        }
        options
    }
}

/// Parent record: a source document with its figures
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Server id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,
    /// Title of the source article
    pub article_title: String,
    /// Source url
    #[serde(default)]
    pub url: Option<String>,
    /// Publication date
    #[serde(default)]
    pub publish_date: Option<NaiveDate>,
    /// Publishing organizations
    #[serde(default)]
    pub publishers: Vec<LinkedEntity>,
}

impl Entry {
    /// New unsaved entry
    pub fn new(article_title: impl Into<String>) -> Self {
        Self {
            article_title: article_title.into(),
            ..Self::default()
        }
    }

    /// With server id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ServerId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl ParentPayload for Entry {
    fn server_id(&self) -> Option<&ServerId> {
        self.id.as_ref()
    }

    fn linked_options(&self) -> Vec<LinkedOption> {
        self.publishers
            .iter()
            .map(|p| p.as_option(OptionKind::Organization))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn household_total_uses_size() {
        let figure = Figure::new("NPL").with_reported(10).in_households(4.5);
        assert_eq!(figure.total(), Some(45));
    }

    #[test]
    fn household_total_needs_size() {
        let mut figure = Figure::new("NPL").with_reported(10);
        figure.unit = FigureUnit::Household;
        assert_eq!(figure.total(), None);
    }

    #[test]
    fn linked_options_cover_every_kind() {
        let mut figure = Figure::new("SDN").with_event(LinkedEntity::new("3", "Floods 2024"));
        figure.sources.push(LinkedEntity::new("11", "OCHA"));
        figure.tags.push(LinkedEntity::new("4", "urban"));
        figure
            .context_of_violence
            .push(LinkedEntity::new("2", "Armed conflict"));

        let kinds: Vec<_> = figure.linked_options().iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OptionKind::Organization,
                OptionKind::Tag,
                OptionKind::ContextOfViolence,
                OptionKind::Event,
            ]
        );
    }

    #[test]
    fn unsaved_figure_omits_id_on_the_wire() {
        let figure = Figure::new("PHL").with_reported(5);
        let value = serde_json::to_value(&figure).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["reported"], 5);
        assert_eq!(value["role"], "RECOMMENDED");
    }

    #[test]
    fn attach_parent_sets_entry() {
        let mut figure = Figure::new("PHL");
        figure.attach_parent(&ServerId::from("88"));
        assert_eq!(figure.entry, Some(ServerId::from("88")));
    }
}
