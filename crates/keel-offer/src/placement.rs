//! Placement rule matching against an offer's host and attributes.

use keel_core::{Offer, PlacementRule};

/// Whether the offer satisfies the rule.
pub fn matches(rule: &PlacementRule, offer: &Offer) -> bool {
    match rule {
        PlacementRule::Hostname { hostnames } => hostnames.iter().any(|h| *h == offer.hostname),
        PlacementRule::AvoidHostname { hostnames } => {
            !hostnames.iter().any(|h| *h == offer.hostname)
        }
        PlacementRule::Attribute { name, value } => offer
            .attributes
            .iter()
            .any(|a| a.name == *name && a.value == *value),
        PlacementRule::And { rules } => rules.iter().all(|r| matches(r, offer)),
        PlacementRule::Or { rules } => rules.iter().any(|r| matches(r, offer)),
        PlacementRule::Not { rule } => !matches(rule, offer),
    }
}

/// Short human-readable rendering of a rule, for outcome reasons.
pub fn describe(rule: &PlacementRule) -> String {
    match rule {
        PlacementRule::Hostname { hostnames } => format!("hostname in [{}]", hostnames.join(", ")),
        PlacementRule::AvoidHostname { hostnames } => {
            format!("hostname not in [{}]", hostnames.join(", "))
        }
        PlacementRule::Attribute { name, value } => format!("{name}:{value}"),
        PlacementRule::And { rules } => join(rules, " and "),
        PlacementRule::Or { rules } => join(rules, " or "),
        PlacementRule::Not { rule } => format!("not {}", describe(rule)),
    }
}

fn join(rules: &[PlacementRule], separator: &str) -> String {
    let parts: Vec<String> = rules.iter().map(describe).collect();
    format!("({})", parts.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::Attribute;

    fn offer(hostname: &str, zone: &str) -> Offer {
        Offer {
            id: "o".to_string(),
            agent_id: "a".to_string(),
            hostname: hostname.to_string(),
            resources: Vec::new(),
            attributes: vec![Attribute {
                name: "zone".to_string(),
                value: zone.to_string(),
            }],
            executor_ids: Vec::new(),
        }
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hostname_rules() {
        let only = PlacementRule::Hostname { hostnames: hosts(&["h1", "h2"]) };
        let avoid = PlacementRule::AvoidHostname { hostnames: hosts(&["h1"]) };
        assert!(matches(&only, &offer("h2", "a")));
        assert!(!matches(&only, &offer("h3", "a")));
        assert!(!matches(&avoid, &offer("h1", "a")));
        assert!(matches(&avoid, &offer("h3", "a")));
    }

    #[test]
    fn combinators() {
        let zone_a = PlacementRule::Attribute {
            name: "zone".to_string(),
            value: "a".to_string(),
        };
        let rule = PlacementRule::And {
            rules: vec![
                zone_a.clone(),
                PlacementRule::Not {
                    rule: Box::new(PlacementRule::Hostname { hostnames: hosts(&["h1"]) }),
                },
            ],
        };
        assert!(matches(&rule, &offer("h2", "a")));
        assert!(!matches(&rule, &offer("h1", "a")));
        assert!(!matches(&rule, &offer("h2", "b")));

        let either = PlacementRule::Or {
            rules: vec![zone_a, PlacementRule::Hostname { hostnames: hosts(&["h9"]) }],
        };
        assert!(matches(&either, &offer("h9", "b")));
        assert_eq!(describe(&either), "(zone:a or hostname in [h9])");
    }
}
