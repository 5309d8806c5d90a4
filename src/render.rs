use crate::format::format_timestamp;
use crate::model::{SnapshotEnvelope, StructuralError, Variant};
use crate::view::{build_card, CardViewModel};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Element {
        tag: &'static str,
        classes: Vec<String>,
        children: Vec<Markup>,
    },
    Text(String),
}

impl Markup {
    pub fn div<I, S>(classes: I, children: Vec<Markup>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Markup::Element {
            tag: "div",
            classes: classes.into_iter().map(Into::into).collect(),
            children,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Markup::Text(s.into())
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Markup::Text(text) => out.push_str(&escape_html(text)),
            Markup::Element {
                tag,
                classes,
                children,
            } => {
                if classes.is_empty() {
                    let _ = write!(out, "<{tag}>");
                } else {
                    let _ = write!(out, "<{tag} class=\"{}\">", escape_html(&classes.join(" ")));
                }
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub markup: Markup,
    /// `None` leaves whatever status line is currently shown untouched.
    pub status_line: Option<String>,
    pub cards: Vec<CardViewModel>,
}

/// Renders a snapshot (or its absence) into markup plus a status line.
///
/// All cards are built before anything is returned: one malformed record
/// fails the whole render, there is no partial output.
pub fn render(
    variant: Variant,
    envelope: Option<&SnapshotEnvelope>,
) -> Result<Rendered, StructuralError> {
    let profile = variant.profile();
    let placeholder = |text: &str| Markup::div([format!("no-{}", profile.entity_key)], vec![Markup::text(text)]);

    let Some((envelope, entities)) =
        envelope.and_then(|env| env.entities.as_ref().map(|entities| (env, entities)))
    else {
        return Ok(Rendered {
            markup: placeholder(profile.absent_placeholder),
            status_line: None,
            cards: Vec::new(),
        });
    };

    let cards = entities
        .iter()
        .enumerate()
        .map(|(index, raw)| build_card(variant, index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let markup = if cards.is_empty() {
        placeholder(profile.empty_placeholder)
    } else {
        Markup::div(
            [format!("{}-grid", profile.css_prefix)],
            cards.iter().map(|c| card_markup(variant, c)).collect(),
        )
    };

    let status_line = format!(
        "Last updated: {} ({} {} found)",
        format_timestamp(envelope.timestamp.as_ref()),
        envelope.entity_count(),
        profile.plural_noun
    );

    Ok(Rendered {
        markup,
        status_line: Some(status_line),
        cards,
    })
}

fn card_markup(variant: Variant, card: &CardViewModel) -> Markup {
    let prefix = variant.profile().css_prefix;

    let header = Markup::div(
        [format!("{prefix}-header")],
        vec![
            Markup::div([format!("{prefix}-name")], vec![Markup::text(&card.title)]),
            Markup::div(
                [
                    format!("{prefix}-status"),
                    card.state_class.clone(),
                    format!("status-{}", card.state_class),
                ],
                vec![Markup::text(&card.state_label)],
            ),
        ],
    );

    let metrics = Markup::div(
        [format!("{prefix}-metrics")],
        card.metrics
            .iter()
            .map(|m| {
                let mut children = vec![
                    Markup::div(["metric-label"], vec![Markup::text(&m.label)]),
                    Markup::div(["metric-value"], vec![Markup::text(&m.value)]),
                ];
                if let Some(subtitle) = &m.subtitle {
                    children.push(Markup::div(["metric-subtitle"], vec![Markup::text(subtitle)]));
                }
                Markup::div(["metric"], children)
            })
            .collect(),
    );

    let details = Markup::div(
        [format!("{prefix}-details")],
        card.detail_rows
            .iter()
            .map(|row| {
                let mut value_classes = vec!["detail-value".to_string()];
                value_classes.extend(row.emphasis_class.clone());
                Markup::div(
                    ["detail-row"],
                    vec![
                        Markup::div(["detail-label"], vec![Markup::text(format!("{}:", row.label))]),
                        Markup::div(value_classes, vec![Markup::text(&row.value)]),
                    ],
                )
            })
            .collect(),
    );

    Markup::div(
        ["card".to_string(), format!("{prefix}-card"), card.state_class.clone()],
        vec![header, metrics, details],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_timestamp;
    use crate::model::decode_envelope;
    use serde_json::json;

    const TS: &str = "2024-05-01T12:30:00+00:00";

    fn envelope(variant: Variant, doc: serde_json::Value) -> SnapshotEnvelope {
        decode_envelope(variant, doc.to_string().as_bytes()).expect("decode")
    }

    #[test]
    fn absent_data_renders_placeholder_without_status() {
        let out = render(Variant::Bridges, None).expect("render");
        assert_eq!(out.markup.to_html(), "<div class=\"no-bridges\">No bridges found</div>");
        assert_eq!(out.status_line, None);

        let env = envelope(Variant::Vms, json!({"timestamp": TS}));
        let out = render(Variant::Vms, Some(&env)).expect("render");
        assert_eq!(out.markup.to_html(), "<div class=\"no-vms\">No Nexus 9000v VMs found</div>");
        assert_eq!(out.status_line, None);
    }

    #[test]
    fn empty_bridge_list() {
        let env = envelope(Variant::Bridges, json!({"bridges": [], "bridge_count": 0, "timestamp": TS}));
        let out = render(Variant::Bridges, Some(&env)).expect("render");

        assert_eq!(
            out.markup.to_html(),
            "<div class=\"no-bridges\">No bridges found on this system</div>"
        );
        let expected = format!(
            "Last updated: {} (0 bridges found)",
            format_timestamp(Some(&json!(TS)))
        );
        assert_eq!(out.status_line.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn empty_vm_list() {
        let env = envelope(Variant::Vms, json!({"vms": [], "vm_count": 0}));
        let out = render(Variant::Vms, Some(&env)).expect("render");
        assert!(out.markup.to_html().contains("No Nexus 9000v VMs are currently running"));
        assert_eq!(out.status_line.as_deref(), Some("Last updated: Unknown (0 VMs found)"));
    }

    #[test]
    fn one_bridge_card() {
        let env = envelope(
            Variant::Bridges,
            json!({
                "bridges": [{
                    "name": "br0", "status": "up", "interfaces": ["eth0", "eth1"],
                    "stp_state": "enabled", "rx_bytes": 2048, "tx_bytes": 0,
                    "rx_packets": 10, "tx_packets": 0, "rx_errors": 0, "tx_errors": 0,
                    "rx_dropped": 0, "tx_dropped": 0
                }],
                "bridge_count": 1,
                "timestamp": TS
            }),
        );
        let out = render(Variant::Bridges, Some(&env)).expect("render");
        let html = out.markup.to_html();

        assert_eq!(out.cards.len(), 1);
        assert!(html.starts_with("<div class=\"bridge-grid\"><div class=\"card bridge-card up\">"));
        assert!(html.contains("<div class=\"bridge-name\">br0</div>"));
        assert!(html.contains("<div class=\"bridge-status up status-up\">UP</div>"));
        assert!(html.contains("<div class=\"metric-value\">2.0 KB</div>"));
        assert!(html.contains("<div class=\"metric-subtitle\">10 packets</div>"));
        assert!(html.contains("<div class=\"detail-value\">eth0, eth1</div>"));
        assert!(html.contains("<div class=\"detail-value stp-enabled\">enabled</div>"));
        assert!(out.status_line.unwrap_or_default().ends_with("(1 bridges found)"));
    }

    #[test]
    fn cards_keep_input_order() {
        let env = envelope(
            Variant::Vms,
            json!({"vms": [
                {"name": "zeta", "status": "running"},
                {"name": "alpha", "status": "stopped"},
                {"name": "mid", "status": "running"}
            ], "vm_count": 3}),
        );
        let out = render(Variant::Vms, Some(&env)).expect("render");
        let titles: Vec<_> = out.cards.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn render_is_idempotent() {
        let env = envelope(
            Variant::Bridges,
            json!({"bridges": [{"name": "br0", "status": "down"}], "bridge_count": 1, "timestamp": TS}),
        );
        let before = env.clone();
        let first = render(Variant::Bridges, Some(&env)).expect("render");
        let second = render(Variant::Bridges, Some(&env)).expect("render");
        assert_eq!(first, second);
        assert_eq!(first.markup.to_html(), second.markup.to_html());
        assert_eq!(env, before);
    }

    #[test]
    fn malformed_record_fails_whole_render() {
        let env = envelope(
            Variant::Bridges,
            json!({"bridges": [{"name": "br0", "status": "up"}, {"status": "up"}]}),
        );
        let err = render(Variant::Bridges, Some(&env)).unwrap_err();
        assert_eq!(err, StructuralError::MissingField { index: 1, field: "name" });
    }

    #[test]
    fn text_is_escaped() {
        let env = envelope(
            Variant::Vms,
            json!({"vms": [{"name": "<script>alert(1)</script>", "status": "running"}]}),
        );
        let html = render(Variant::Vms, Some(&env)).expect("render").markup.to_html();
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
