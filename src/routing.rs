//! View selection for completed submissions
//!
//! A completed workflow produces a [`RoutingDirective`]: which page the
//! requester is sent to, plus the two identifiers that page displays. The
//! choice of page depends on the classification alone.
//!
//! ```text
//! escalation category  →  /crpf-info?crpf_id=..&incharge_id=..
//! anything else        →  /tt-info?tt_id=..&incharge_id=..
//! ```

use crate::classifier::ClassificationTag;
use crate::resolver::ResponsibilityRecord;
use serde::{Deserialize, Serialize};

/// Presentation view a directive points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Security escort page for the escalation category
    Escalation,
    /// Ticket examiner page for everything else
    Default,
}

impl View {
    /// Path of the page rendering this view
    pub fn path(&self) -> &'static str {
        match self {
            View::Escalation => "/crpf-info",
            View::Default => "/tt-info",
        }
    }

    /// Query parameter carrying the responsible person's identifier
    pub fn person_param(&self) -> &'static str {
        match self {
            View::Escalation => "crpf_id",
            View::Default => "tt_id",
        }
    }
}

/// Query parameter carrying the route in-charge identifier
pub const INCHARGE_PARAM: &str = "incharge_id";

/// Decides which view a classification lands on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    escalation_category: ClassificationTag,
}

impl RoutingPolicy {
    pub fn new(escalation_category: ClassificationTag) -> Self {
        Self {
            escalation_category,
        }
    }

    pub fn is_escalation(&self, tag: &ClassificationTag) -> bool {
        *tag == self.escalation_category
    }

    pub fn select_view(&self, tag: &ClassificationTag) -> View {
        if self.is_escalation(tag) {
            View::Escalation
        } else {
            View::Default
        }
    }

    /// Build the directive for a resolved submission
    pub fn direct(&self, tag: ClassificationTag, record: ResponsibilityRecord) -> RoutingDirective {
        RoutingDirective {
            view: self.select_view(&tag),
            classification: tag,
            responsible_person: record.responsible_person,
            route_incharge: record.route_incharge,
        }
    }
}

/// Outcome handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDirective {
    pub view: View,
    pub classification: ClassificationTag,
    pub responsible_person: String,
    pub route_incharge: String,
}

impl RoutingDirective {
    /// Relative URL of the target page with identifiers as query parameters
    pub fn location(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(self.view.person_param(), &self.responsible_person)
            .append_pair(INCHARGE_PARAM, &self.route_incharge)
            .finish();
        format!("{}?{}", self.view.path(), query)
    }

    pub fn is_escalation(&self) -> bool {
        self.view == View::Escalation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> RoutingPolicy {
        RoutingPolicy::new(ClassificationTag::parse("violence").unwrap())
    }

    fn record(person: &str) -> ResponsibilityRecord {
        ResponsibilityRecord {
            responsible_person: person.to_string(),
            route_incharge: "RI-02".to_string(),
        }
    }

    #[test]
    fn test_escalation_directive() {
        let tag = ClassificationTag::parse("violence").unwrap();
        let directive = policy().direct(tag, record("CRPF-07"));

        assert_eq!(directive.view, View::Escalation);
        assert!(directive.is_escalation());
        assert_eq!(
            directive.location(),
            "/crpf-info?crpf_id=CRPF-07&incharge_id=RI-02"
        );
    }

    #[test]
    fn test_default_directive() {
        let tag = ClassificationTag::parse("normal").unwrap();
        let directive = policy().direct(tag, record("TT-11"));

        assert_eq!(directive.view, View::Default);
        assert_eq!(directive.location(), "/tt-info?tt_id=TT-11&incharge_id=RI-02");
    }

    #[test]
    fn test_location_encodes_identifiers() {
        let tag = ClassificationTag::parse("normal").unwrap();
        let directive = policy().direct(tag, record("TT 11&x=1"));

        assert_eq!(
            directive.location(),
            "/tt-info?tt_id=TT+11%26x%3D1&incharge_id=RI-02"
        );
    }

    #[test]
    fn test_directive_serialization() {
        let tag = ClassificationTag::parse("violence").unwrap();
        let directive = policy().direct(tag, record("CRPF-07"));

        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["view"], "escalation");
        assert_eq!(json["classification"], "violence");
        assert_eq!(json["responsible_person"], "CRPF-07");
    }

    proptest! {
        #[test]
        fn prop_view_depends_only_on_tag(
            label in "[a-z]{1,10}",
            person_a in "[A-Z]{2,4}-[0-9]{2}",
            person_b in "[A-Z]{2,4}-[0-9]{2}",
        ) {
            let tag = ClassificationTag::parse(&label).unwrap();
            let a = policy().direct(tag.clone(), record(&person_a));
            let b = policy().direct(tag.clone(), record(&person_b));

            prop_assert_eq!(a.view, b.view);
            prop_assert_eq!(a.view == View::Escalation, label == "violence");
        }
    }
}
