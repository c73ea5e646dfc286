/*!
Status text composition: hashtags, footer and length limit
*/

use assembly_database::Event;
use chrono_tz::Tz;
use regex::Regex;

use crate::core::config::SimpleSearchConfig;

/// Character limit of a status on the target server
pub const MAX_STATUS_CHARS: usize = 500;

const ELLIPSIS: char = '…';

/// Prefixes known words with `#`
#[derive(Debug, Clone)]
pub struct Hashtagger {
    pattern: Option<Regex>,
}

impl Hashtagger {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Result<Self, regex::Error> {
        if tags.is_empty() {
            return Ok(Self { pattern: None });
        }

        let alternatives: Vec<String> = tags.iter().map(|t| regex::escape(t.as_ref())).collect();
        let pattern = Regex::new(&format!(r"(^|[^#\w])({})\b", alternatives.join("|")))?;
        Ok(Self { pattern: Some(pattern) })
    }

    pub fn tag(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, "${1}#${2}").into_owned(),
            None => text.to_string(),
        }
    }
}

/// Decode HTML5 named and numeric character references
pub fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Link to the event's detail page
pub fn detail_link(config: &SimpleSearchConfig, event_id: i64) -> String {
    let base = config.base.replacen("//www.berlin.de/", "//berlin.de/", 1);
    format!("{}{}{}", base, config.detail, event_id)
}

/// Everything needed to turn an event into status text
#[derive(Debug, Clone)]
pub struct StatusComposer {
    pub config: SimpleSearchConfig,
    pub tagger: Hashtagger,
    pub tz: Tz,
}

impl StatusComposer {
    pub fn compose(&self, event: &Event) -> String {
        compose_status(event, &self.config, &self.tagger, self.tz)
    }
}

/// Build the announcement for an event
pub fn compose_status(event: &Event, config: &SimpleSearchConfig, tagger: &Hashtagger, tz: Tz) -> String {
    let mut body = unescape_html(&event.subject);
    if !event.street.is_empty() {
        body.push_str("\n\nOrt: ");
        body.push_str(&unescape_html(&event.street));
        if !event.postal_code.is_empty() {
            body.push_str(&format!(", {} Berlin", event.postal_code));
        }
    } else if !event.route.is_empty() {
        body.push_str("\n\n");
        body.push_str(&unescape_html(&event.route));
    }

    let footer = format!(
        "\nBeginn: {} Uhr\n\n{}\n{}",
        event.start.with_timezone(&tz).format("%-d.%-m. %H:%M"),
        config.title,
        detail_link(config, event.id)
    );

    let tagged = tagger.tag(&body);
    if tagged.chars().count() + footer.chars().count() <= MAX_STATUS_CHARS {
        return tagged + &footer;
    }

    let budget = MAX_STATUS_CHARS.saturating_sub(footer.chars().count() + 1);
    format!("{}{}{}", shorten(&body, tagger, budget), ELLIPSIS, footer)
}

/// Longest prefix of `body` whose tagged form fits in `budget` characters
fn shorten(body: &str, tagger: &Hashtagger, budget: usize) -> String {
    let chars: Vec<char> = body.chars().collect();
    let mut keep = budget.min(chars.len());

    loop {
        let prefix: String = chars[..keep].iter().collect();
        let tagged = tagger.tag(prefix.trim_end());
        let length = tagged.chars().count();
        if length <= budget || keep == 0 {
            return tagged;
        }
        keep = keep.saturating_sub(length - budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::Berlin;

    fn tagger() -> Hashtagger {
        Hashtagger::new(&["Demonstration", "Berlin", "Kreuzberg", "Neukölln"]).unwrap()
    }

    fn config() -> SimpleSearchConfig {
        SimpleSearchConfig {
            title: "Versammlungen in Berlin".to_string(),
            ..SimpleSearchConfig::default()
        }
    }

    fn event(subject: &str) -> Event {
        Event {
            id: 4711,
            serial: "1".to_string(),
            start: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            subject: subject.to_string(),
            from: "12:00".to_string(),
            until: "14:00".to_string(),
            postal_code: "10999".to_string(),
            street: "Oranienplatz".to_string(),
            route: String::new(),
        }
    }

    #[test]
    fn test_hashtags() {
        let tagger = tagger();
        assert_eq!(
            tagger.tag("Demonstration in Kreuzberg und Neukölln"),
            "#Demonstration in #Kreuzberg und #Neukölln"
        );
        assert_eq!(tagger.tag("Berliner Demonstrationen"), "Berliner Demonstrationen");
        assert_eq!(tagger.tag("schon #Berlin"), "schon #Berlin");
        assert_eq!(tagger.tag("Kreuzberg/Neukölln"), "#Kreuzberg/#Neukölln");
    }

    #[test]
    fn test_empty_tag_list() {
        let tagger = Hashtagger::new::<&str>(&[]).unwrap();
        assert_eq!(tagger.tag("Demonstration"), "Demonstration");
    }

    #[test]
    fn test_tags_after_unescape() {
        let text = unescape_html("Kreuzberg &amp; Neuk&ouml;lln");
        assert_eq!(tagger().tag(&text), "#Kreuzberg & #Neukölln");
    }

    #[test]
    fn test_unescape_html() {
        assert_eq!(unescape_html("&quot;Frieden&quot; &#8211; &#x4A;a"), "\"Frieden\" – Ja");
        assert_eq!(unescape_html("A & B"), "A & B");
        assert_eq!(unescape_html("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_unescape_full_entity_set() {
        assert_eq!(
            unescape_html("Caf&eacute; &laquo;Nie wieder&raquo; &hellip;"),
            "Café «Nie wieder» …"
        );
        assert_eq!(unescape_html("Stra&szlig;e &ndash; Pl&auml;tze"), "Straße – Plätze");
    }

    #[test]
    fn test_detail_link() {
        assert_eq!(
            detail_link(&config(), 4711),
            "https://berlin.de/polizei/service/versammlungsbehoerde/versammlungen-aufzuege/index.php/detail/4711"
        );
    }

    #[test]
    fn test_compose_with_street() {
        let status = compose_status(&event("Demonstration für Frieden"), &config(), &tagger(), Berlin);
        assert_eq!(
            status,
            "#Demonstration für Frieden\n\nOrt: Oranienplatz, 10999 #Berlin\n\
             Beginn: 1.5. 12:00 Uhr\n\n\
             Versammlungen in Berlin\n\
             https://berlin.de/polizei/service/versammlungsbehoerde/versammlungen-aufzuege/index.php/detail/4711"
        );
    }

    #[test]
    fn test_compose_with_route() {
        let mut e = event("Fahrradkorso");
        e.street.clear();
        e.route = "Kreuzberg - Mitte".to_string();
        let status = compose_status(&e, &config(), &tagger(), Berlin);
        assert!(status.starts_with("Fahrradkorso\n\n#Kreuzberg - Mitte\nBeginn: 1.5. 12:00 Uhr"));
    }

    #[test]
    fn test_long_status_truncated_with_footer_intact() {
        let subject = "Demonstration gegen Verdrängung in Kreuzberg ".repeat(20);
        let status = compose_status(&event(&subject), &config(), &tagger(), Berlin);

        let footer = "\nBeginn: 1.5. 12:00 Uhr\n\nVersammlungen in Berlin\n\
                      https://berlin.de/polizei/service/versammlungsbehoerde/versammlungen-aufzuege/index.php/detail/4711";
        assert!(status.chars().count() <= MAX_STATUS_CHARS);
        assert!(status.ends_with(footer));
        let body = status.strip_suffix(footer).unwrap();
        assert!(body.ends_with(ELLIPSIS));
        assert!(body.starts_with("#Demonstration gegen Verdrängung in #Kreuzberg"));
        assert!(!body.contains("Ort:"));
    }

    #[test]
    fn test_status_at_limit_not_truncated() {
        let e = event("x");
        let short = compose_status(&e, &config(), &tagger(), Berlin);
        let padding = MAX_STATUS_CHARS - short.chars().count();

        let exact = compose_status(&event(&"x".repeat(1 + padding)), &config(), &tagger(), Berlin);
        assert_eq!(exact.chars().count(), MAX_STATUS_CHARS);
        assert!(!exact.contains(ELLIPSIS));

        let over = compose_status(&event(&"x".repeat(2 + padding)), &config(), &tagger(), Berlin);
        assert_eq!(over.chars().count(), MAX_STATUS_CHARS);
        assert!(over.contains(ELLIPSIS));
    }
}
