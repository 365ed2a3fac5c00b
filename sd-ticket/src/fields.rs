//! `*Key:* value` extraction and the canonical field order used for display.

use regex::Regex;
use std::sync::LazyLock;

static FIELD_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]*):\*").expect("field marker regex is valid"));

/// Keys rendered first, in this order, when present. Compared after normalisation.
const CANONICAL_KEYS: &[&str] = &[
    "Título",
    "Site",
    "Descrição",
    "Informador",
    "Responsables",
    "Responsáveis",
];

pub const TITLE_KEY: &str = "Título";
pub const REPORTER_KEY: &str = "Informador";
pub const UNKNOWN_REPORTER: &str = "Unknown";

/// Insertion-ordered key/value pairs. Re-inserting a key keeps its first position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return;
        }
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Lookup ignoring case, accents and trailing punctuation ("Titulo", "título.").
    pub fn get_normalized(&self, key: &str) -> Option<&str> {
        let wanted = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| normalize_key(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical keys first, then everything else in parse order.
    pub fn canonical_order(&self) -> Vec<(&str, &str)> {
        let mut taken = vec![false; self.entries.len()];
        let mut ordered = Vec::with_capacity(self.entries.len());

        for canonical in CANONICAL_KEYS {
            let canonical = normalize_key(canonical);
            for (idx, (key, value)) in self.entries.iter().enumerate() {
                if !taken[idx] && normalize_key(key) == canonical {
                    taken[idx] = true;
                    ordered.push((key.as_str(), value.as_str()));
                }
            }
        }
        for (idx, (key, value)) in self.entries.iter().enumerate() {
            if !taken[idx] {
                ordered.push((key.as_str(), value.as_str()));
            }
        }
        ordered
    }

    /// Reporter name without leading `@`, or `Unknown`.
    pub fn reporter(&self) -> String {
        normalize_reporter(self.get_normalized(REPORTER_KEY))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Parse `*KEY:* VALUE` markers. A value runs, newlines included, until the next
/// marker or end of text. Pairs with a blank key or value are dropped.
pub fn parse_key_values(text: &str) -> FieldMap {
    let markers: Vec<_> = FIELD_MARKER.captures_iter(text).collect();
    let mut fields = FieldMap::new();

    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value_end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let key = key.as_str().trim();
        let value = text[whole.end()..value_end].trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        fields.insert(key, value);
    }
    fields
}

pub(crate) fn is_reporter_key(key: &str) -> bool {
    normalize_key(key) == normalize_key(REPORTER_KEY)
}

pub fn normalize_reporter(raw: Option<&str>) -> String {
    let cleaned = raw.unwrap_or_default().trim().trim_start_matches('@').trim();
    if cleaned.is_empty() {
        UNKNOWN_REPORTER.to_string()
    } else {
        cleaned.to_string()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .chars()
        .map(fold_accent)
        .flat_map(char::to_lowercase)
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_in_source_order() {
        let fields = parse_key_values("*Título:* Falha\n*Site:* SP\n*Informador:* @joao");
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(
            pairs,
            vec![("Título", "Falha"), ("Site", "SP"), ("Informador", "@joao")]
        );
    }

    #[test]
    fn values_span_lines_until_next_marker() {
        let text = "Alerta recebido\n*Descrição:* linha um\nlinha dois\n\n*Site:*  RJ  ";
        let fields = parse_key_values(text);
        assert_eq!(fields.get("Descrição"), Some("linha um\nlinha dois"));
        assert_eq!(fields.get("Site"), Some("RJ"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn blank_keys_and_values_are_dropped() {
        let fields = parse_key_values("*:* orphan *Site:*   *Título:* ok");
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(pairs, vec![("Título", "ok")]);
    }

    #[test]
    fn text_without_markers_yields_empty_map() {
        assert!(parse_key_values("servidor fora do ar").is_empty());
        assert!(parse_key_values("*negrito* apenas").is_empty());
    }

    #[test]
    fn repeated_key_keeps_first_position() {
        let fields = parse_key_values("*Site:* SP *Título:* A *Site:* RJ");
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(pairs, vec![("Site", "RJ"), ("Título", "A")]);
    }

    #[test]
    fn canonical_order_puts_preferred_keys_first() {
        let fields: FieldMap = [("Site", "SP"), ("Título", "Falha")].into_iter().collect();
        let ordered = fields.canonical_order();
        assert_eq!(ordered, vec![("Título", "Falha"), ("Site", "SP")]);
    }

    #[test]
    fn canonical_order_keeps_remaining_keys_in_parse_order() {
        let fields: FieldMap = [
            ("Zabbix", "1"),
            ("Responsáveis", "time"),
            ("Alpha", "2"),
            ("Descricao", "texto"),
        ]
        .into_iter()
        .collect();
        let keys: Vec<_> = fields.canonical_order().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Descricao", "Responsáveis", "Zabbix", "Alpha"]);
    }

    #[test]
    fn normalized_lookup_matches_punctuated_variants() {
        let fields: FieldMap = [("titulo.", "Falha")].into_iter().collect();
        assert_eq!(fields.get_normalized(TITLE_KEY), Some("Falha"));
    }

    #[test]
    fn reporter_strips_at_sign_and_defaults_to_unknown() {
        let fields: FieldMap = [("Informador", " @joao ")].into_iter().collect();
        assert_eq!(fields.reporter(), "joao");
        assert_eq!(FieldMap::new().reporter(), UNKNOWN_REPORTER);
        assert_eq!(normalize_reporter(Some("@")), UNKNOWN_REPORTER);
    }
}
