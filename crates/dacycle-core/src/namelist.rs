//! Fortran namelist editing.
//!
//! A template is parsed into groups and entries while keeping every source
//! line. Rendering writes untouched lines back verbatim, so comments,
//! alignment and entries nobody overrode survive exactly as the template
//! author wrote them. Only overridden entries are re-rendered.

use crate::error::{CycleError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NmlValue {
    Str(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    List(Vec<NmlValue>),
}

impl NmlValue {
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NmlValue::List(items.into_iter().map(|s| NmlValue::Str(s.into())).collect())
    }

    /// Fortran literal for a scalar; list elements joined with `, `.
    pub fn render(&self) -> String {
        match self {
            NmlValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
            NmlValue::Int(i) => i.to_string(),
            NmlValue::Real(r) => render_real(*r),
            NmlValue::Bool(true) => ".true.".to_string(),
            NmlValue::Bool(false) => ".false.".to_string(),
            NmlValue::List(items) => items
                .iter()
                .map(NmlValue::render)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn render_real(r: f64) -> String {
    if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e15 {
        format!("{r:.1}")
    } else {
        format!("{r}")
    }
}

impl From<&str> for NmlValue {
    fn from(s: &str) -> Self {
        NmlValue::Str(s.to_string())
    }
}

impl From<String> for NmlValue {
    fn from(s: String) -> Self {
        NmlValue::Str(s)
    }
}

impl From<i64> for NmlValue {
    fn from(i: i64) -> Self {
        NmlValue::Int(i)
    }
}

impl From<f64> for NmlValue {
    fn from(r: f64) -> Self {
        NmlValue::Real(r)
    }
}

impl From<bool> for NmlValue {
    fn from(b: bool) -> Self {
        NmlValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Ordered `group.key = value` assignments. Names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    entries: Vec<(String, String, NmlValue)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `group.key`, replacing an earlier assignment of the same field.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<NmlValue>) -> &mut Self {
        let group = normalize(group);
        let key = normalize(key);
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(g, k, _)| *g == group && *k == key)
        {
            Some(slot) => slot.2 = value,
            None => self.entries.push((group, key, value)),
        }
        self
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&NmlValue> {
        let group = normalize(group);
        let key = normalize(key);
        self.entries
            .iter()
            .find(|(g, k, _)| *g == group && *k == key)
            .map(|(_, _, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &NmlValue)> {
        self.entries
            .iter()
            .map(|(g, k, v)| (g.as_str(), k.as_str(), v))
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Item {
    Text(String),
    Group(Group),
}

#[derive(Debug, Clone)]
struct Group {
    name: String,
    header: String,
    slots: Vec<Slot>,
    footer: String,
    /// The terminator shares the line of whatever precedes it.
    footer_inline: bool,
}

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Entry(Entry),
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    lines: Vec<String>,
    /// The first line continues the previous physical line, as in
    /// `a = 1, b = 2` or `&x_nml a = 1 /`.
    inline: bool,
}

impl Group {
    fn open(name: &str, header: String) -> Self {
        Self {
            name: normalize(name),
            header,
            slots: Vec::new(),
            footer: String::new(),
            footer_inline: false,
        }
    }

    fn close(&mut self, footer: &str, inline: bool) {
        self.footer = footer.to_string();
        self.footer_inline = inline;
    }

    /// Add one piece of a body line. A piece without a key continues the
    /// previous entry's value, which is only possible at the start of a line.
    fn take_piece(&mut self, piece: &str, inline: bool, lineno: usize) -> Result<()> {
        if let Some(caps) = entry_re().captures(strip_comment(piece)) {
            self.slots.push(Slot::Entry(Entry {
                key: normalize(&caps[2]),
                lines: vec![piece.to_string()],
                inline,
            }));
            return Ok(());
        }
        let last = self.slots.iter_mut().rev().find_map(|s| match s {
            Slot::Entry(e) => Some(e),
            Slot::Text(_) => None,
        });
        match last {
            Some(entry) if !inline => {
                entry.lines.push(piece.to_string());
                Ok(())
            }
            _ => Err(CycleError::NamelistParse {
                line: lineno,
                reason: format!("value without a key in group '{}'", self.name),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Namelist {
    items: Vec<Item>,
    trailing_newline: bool,
}

static HEADER_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| Regex::new(r"^\s*[&$]([A-Za-z][A-Za-z0-9_]*)\s*(.*)$").unwrap())
}

fn entry_re() -> &'static Regex {
    ENTRY_RE.get_or_init(|| {
        Regex::new(r"^([\s,]*)([A-Za-z][A-Za-z0-9_%]*(?:\s*\([^)]*\))?)\s*=").unwrap()
    })
}

/// Everything before a `!` comment, ignoring `!` inside quoted strings.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '!') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Byte offset of a `/` that terminates the group, if any, outside strings.
fn inline_terminator(content: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in content.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '/') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Cut a body line into one piece per assignment plus an inline terminator.
///
/// Pieces keep their leading separator, so `a = 1, b = 2` becomes
/// `a = 1` and `, b = 2`, and concatenating everything gives `line` back.
/// `content` is `line` without its comment.
fn split_line<'a>(line: &'a str, content: &str) -> (Vec<&'a str>, Option<&'a str>) {
    let (body_end, footer) = match inline_terminator(content) {
        Some(pos) => {
            let end = line[..pos].trim_end().len();
            (end, Some(&line[end..]))
        }
        None => (line.len(), None),
    };
    let scan = &content[..body_end.min(content.len())];

    let mut starts = vec![0];
    let mut quote: Option<char> = None;
    let mut depth = 0u32;
    for (i, c) in scan.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if i > 0 && depth == 0 && entry_re().is_match(&scan[i..]) => starts.push(i),
            _ => {}
        }
    }

    let pieces = starts
        .iter()
        .enumerate()
        .map(|(n, &start)| (start, starts.get(n + 1).copied().unwrap_or(body_end)))
        .filter(|(start, end)| end > start)
        .map(|(start, end)| &line[start..end])
        .collect();
    (pieces, footer)
}

fn is_footer(content: &str) -> bool {
    let t = content.trim();
    t == "/" || t.eq_ignore_ascii_case("&end") || t.eq_ignore_ascii_case("$end")
}

impl Namelist {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut items = Vec::new();
        let mut current: Option<Group> = None;

        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let content = strip_comment(line);

            let Some(group) = current.as_mut() else {
                if let Some(caps) = header_re().captures(content) {
                    let name = caps[1].to_string();
                    if name.eq_ignore_ascii_case("end") {
                        return Err(CycleError::NamelistParse {
                            line: lineno,
                            reason: "group terminator outside a group".to_string(),
                        });
                    }
                    let name_end = caps.get(1).map_or(content.len(), |m| m.end());
                    if content[name_end..].trim().is_empty() {
                        current = Some(Group::open(&name, line.to_string()));
                    } else {
                        // `&x_nml a = 1 /`: the body starts on the header line.
                        let mut group = Group::open(&name, line[..name_end].to_string());
                        let (pieces, footer) = split_line(&line[name_end..], &content[name_end..]);
                        for piece in pieces {
                            group.take_piece(piece, true, lineno)?;
                        }
                        match footer {
                            Some(footer) => {
                                group.close(footer, true);
                                items.push(Item::Group(group));
                            }
                            None => current = Some(group),
                        }
                    }
                } else {
                    items.push(Item::Text(line.to_string()));
                }
                continue;
            };

            if is_footer(content) {
                group.close(line, false);
                if let Some(g) = current.take() {
                    items.push(Item::Group(g));
                }
                continue;
            }

            if content.trim().is_empty() {
                group.slots.push(Slot::Text(line.to_string()));
                continue;
            }

            let (pieces, footer) = split_line(line, content);
            let footer_inline = !pieces.is_empty();
            for (n, piece) in pieces.into_iter().enumerate() {
                group.take_piece(piece, n > 0, lineno)?;
            }
            if let Some(footer) = footer {
                group.close(footer, footer_inline);
                if let Some(g) = current.take() {
                    items.push(Item::Group(g));
                }
            }
        }

        if let Some(group) = current {
            return Err(CycleError::NamelistParse {
                line: text.lines().count(),
                reason: format!("group '{}' is not terminated", group.name),
            });
        }

        Ok(Self {
            items,
            trailing_newline: text.ends_with('\n') || text.is_empty(),
        })
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::Group(g) => Some(g.name.as_str()),
                Item::Text(_) => None,
            })
            .collect()
    }

    /// Raw value text of `group.key` with comments and a trailing comma removed.
    pub fn get(&self, group: &str, key: &str) -> Option<String> {
        let entry = self.find_entry(&normalize(group), &normalize(key))?;
        let joined = entry
            .lines
            .iter()
            .map(|l| strip_comment(l).trim())
            .collect::<Vec<_>>()
            .join(" ");
        let (_, value) = joined.split_once('=')?;
        Some(value.trim().trim_end_matches(',').trim_end().to_string())
    }

    fn find_entry(&self, group: &str, key: &str) -> Option<&Entry> {
        self.items.iter().find_map(|item| match item {
            Item::Group(g) if g.name == group => g.slots.iter().find_map(|s| match s {
                Slot::Entry(e) if e.key == key => Some(e),
                _ => None,
            }),
            _ => None,
        })
    }

    /// Apply every override: replace matching entries in place, append
    /// missing keys to their group, and create missing groups at the end.
    pub fn apply(&mut self, overrides: &Overrides) {
        for (group_name, key, value) in overrides.iter() {
            let idx = match self
                .items
                .iter()
                .position(|item| matches!(item, Item::Group(g) if g.name == group_name))
            {
                Some(i) => i,
                None => {
                    let mut group = Group::open(group_name, format!("&{group_name}"));
                    group.close("/", false);
                    self.items.push(Item::Group(group));
                    self.items.len() - 1
                }
            };
            let Item::Group(group) = &mut self.items[idx] else {
                continue;
            };

            let existing = group
                .slots
                .iter()
                .position(|s| matches!(s, Slot::Entry(e) if e.key == key));
            match existing.map(|i| &mut group.slots[i]) {
                Some(Slot::Entry(entry)) => {
                    let (indent, written_key) = match entry_re().captures(&entry.lines[0]) {
                        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
                        None => ("   ".to_string(), key.to_string()),
                    };
                    entry.lines = render_entry(&indent, &written_key, value);
                }
                _ => group.slots.push(Slot::Entry(Entry {
                    key: key.to_string(),
                    lines: render_entry("   ", key, value),
                    inline: false,
                })),
            }
        }
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for item in &self.items {
            match item {
                Item::Text(t) => push_line(&mut lines, t, false),
                Item::Group(g) => {
                    push_line(&mut lines, &g.header, false);
                    for slot in &g.slots {
                        match slot {
                            Slot::Text(t) => push_line(&mut lines, t, false),
                            Slot::Entry(e) => {
                                for (i, l) in e.lines.iter().enumerate() {
                                    push_line(&mut lines, l, i == 0 && e.inline);
                                }
                            }
                        }
                    }
                    push_line(&mut lines, &g.footer, g.footer_inline);
                }
            }
        }
        let mut out = lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn push_line(lines: &mut Vec<String>, text: &str, inline: bool) {
    match lines.last_mut() {
        Some(last) if inline => last.push_str(text),
        _ => lines.push(text.to_string()),
    }
}

/// `key = value`. String lists go one element per line, aligned under the
/// first element.
fn render_entry(indent: &str, key: &str, value: &NmlValue) -> Vec<String> {
    let lead = format!("{indent}{key} = ");
    match value {
        NmlValue::List(items)
            if items.len() > 1 && items.iter().any(|v| matches!(v, NmlValue::Str(_))) =>
        {
            let pad = " ".repeat(lead.len());
            let last = items.len() - 1;
            items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let prefix = if i == 0 { lead.as_str() } else { pad.as_str() };
                    let sep = if i == last { "" } else { "," };
                    format!("{prefix}{}{sep}", v.render())
                })
                .collect()
        }
        other => vec![format!("{lead}{}", other.render())],
    }
}

/// Render `template` with `overrides` applied. Pure: same inputs, same bytes.
pub fn render_namelist(template: &str, overrides: &Overrides) -> Result<String> {
    let mut nml = Namelist::parse(template)?;
    nml.apply(overrides);
    Ok(nml.render())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
! DART input namelist
&filter_nml
   async                       = 0,
   ens_size                    = 3,
   inf_initial_from_restart    = .false.,                 .false.,
   obs_sequence_in_name        = 'obs_seq.out',  ! observation input
   inf_flavor                  = 2,
                                 0,
/

&model_nml
   init_template_filename       = 'mpas_init.nc',
   vert_localization_coord      = 3
/

&obs_kind_nml
   assimilate_these_obs_types = 'RADIOSONDE_TEMPERATURE',
                                'RADIOSONDE_U_WIND_COMPONENT'
   evaluate_these_obs_types   = ''
/
";

    #[test]
    fn no_overrides_is_verbatim() {
        let out = render_namelist(TEMPLATE, &Overrides::new()).unwrap();
        assert_eq!(out, TEMPLATE);
    }

    #[test]
    fn parses_groups_and_values() {
        let nml = Namelist::parse(TEMPLATE).unwrap();
        assert_eq!(nml.group_names(), vec!["filter_nml", "model_nml", "obs_kind_nml"]);
        assert_eq!(nml.get("filter_nml", "ens_size").as_deref(), Some("3"));
        assert_eq!(
            nml.get("FILTER_NML", "Obs_Sequence_In_Name").as_deref(),
            Some("'obs_seq.out'")
        );
        assert_eq!(nml.get("filter_nml", "inf_flavor").as_deref(), Some("2, 0"));
        assert_eq!(
            nml.get("obs_kind_nml", "assimilate_these_obs_types").as_deref(),
            Some("'RADIOSONDE_TEMPERATURE', 'RADIOSONDE_U_WIND_COMPONENT'")
        );
    }

    #[test]
    fn override_replaces_in_place_and_keeps_the_rest() {
        let mut ov = Overrides::new();
        ov.set("filter_nml", "ens_size", 40i64);
        ov.set("model_nml", "init_template_filename", "/scratch/init/member00/x1.10242.init.nc");
        let out = render_namelist(TEMPLATE, &ov).unwrap();
        let nml = Namelist::parse(&out).unwrap();

        assert_eq!(nml.get("filter_nml", "ens_size").as_deref(), Some("40"));
        assert_eq!(
            nml.get("model_nml", "init_template_filename").as_deref(),
            Some("'/scratch/init/member00/x1.10242.init.nc'")
        );
        assert_eq!(nml.get("filter_nml", "async").as_deref(), Some("0"));
        assert_eq!(nml.get("model_nml", "vert_localization_coord").as_deref(), Some("3"));
        assert!(out.contains("   ens_size = 40\n"));
        assert!(out.contains("! DART input namelist"));
    }

    #[test]
    fn multi_line_value_replaced_whole() {
        let mut ov = Overrides::new();
        ov.set(
            "obs_kind_nml",
            "assimilate_these_obs_types",
            NmlValue::strings(["GOES_16_ABI_RADIANCE"]),
        );
        let out = render_namelist(TEMPLATE, &ov).unwrap();
        assert!(!out.contains("RADIOSONDE_U_WIND_COMPONENT"));
        let nml = Namelist::parse(&out).unwrap();
        assert_eq!(
            nml.get("obs_kind_nml", "assimilate_these_obs_types").as_deref(),
            Some("'GOES_16_ABI_RADIANCE'")
        );
        assert_eq!(
            nml.get("obs_kind_nml", "evaluate_these_obs_types").as_deref(),
            Some("''")
        );
    }

    #[test]
    fn list_rendered_one_per_line() {
        let mut ov = Overrides::new();
        ov.set("mpas_vars_nml", "mpas_state_variables", NmlValue::strings(["theta", "qv"]));
        let out = render_namelist(TEMPLATE, &ov).unwrap();
        assert!(out.ends_with(
            "&mpas_vars_nml\n   mpas_state_variables = 'theta',\n                          'qv'\n/\n"
        ));
    }

    #[test]
    fn missing_key_appended_before_terminator() {
        let mut ov = Overrides::new();
        ov.set("model_nml", "calendar", "Gregorian");
        let out = render_namelist(TEMPLATE, &ov).unwrap();
        assert!(out.contains("   vert_localization_coord      = 3\n   calendar = 'Gregorian'\n/\n"));
    }

    #[test]
    fn logical_pair_override() {
        let mut ov = Overrides::new();
        ov.set(
            "filter_nml",
            "inf_initial_from_restart",
            NmlValue::List(vec![true.into(), true.into()]),
        );
        let out = render_namelist(TEMPLATE, &ov).unwrap();
        let nml = Namelist::parse(&out).unwrap();
        assert_eq!(
            nml.get("filter_nml", "inf_initial_from_restart").as_deref(),
            Some(".true., .true.")
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut ov = Overrides::new();
        ov.set("filter_nml", "cutoff", 0.05f64);
        ov.set("filter_nml", "distribute_mean", true);
        let a = render_namelist(TEMPLATE, &ov).unwrap();
        let b = render_namelist(TEMPLATE, &ov).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn later_set_wins() {
        let mut ov = Overrides::new();
        ov.set("filter_nml", "ens_size", 10i64);
        ov.set("FILTER_NML", "ENS_SIZE", 20i64);
        assert_eq!(ov.len(), 1);
        assert_eq!(ov.get("filter_nml", "ens_size"), Some(&NmlValue::Int(20)));
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(NmlValue::Real(10000.0).render(), "10000.0");
        assert_eq!(NmlValue::Real(0.05).render(), "0.05");
        assert_eq!(NmlValue::Str("it's".to_string()).render(), "'it''s'");
        assert_eq!(NmlValue::Bool(false).render(), ".false.");
    }

    #[test]
    fn comment_bang_inside_string_kept() {
        let text = "&x_nml\n   msg = 'hi! there' ! note\n/\n";
        let nml = Namelist::parse(text).unwrap();
        assert_eq!(nml.get("x_nml", "msg").as_deref(), Some("'hi! there'"));
    }

    #[test]
    fn slash_inside_path_is_not_a_terminator() {
        let text = "&x_nml\n   path = '/a/b/c'\n/\n";
        let nml = Namelist::parse(text).unwrap();
        assert_eq!(nml.get("x_nml", "path").as_deref(), Some("'/a/b/c'"));
        assert_eq!(nml.render(), text);
    }

    #[test]
    fn inline_terminator_closes_group() {
        let text = "&x_nml\n   a = 1 / ! done\n&y_nml\n   b = 2\n/\n";
        let nml = Namelist::parse(text).unwrap();
        assert_eq!(nml.group_names(), vec!["x_nml", "y_nml"]);
        assert_eq!(nml.get("x_nml", "a").as_deref(), Some("1"));
        assert_eq!(nml.render(), text);

        let mut ov = Overrides::new();
        ov.set("x_nml", "a", 7i64);
        let out = render_namelist(text, &ov).unwrap();
        assert!(out.starts_with("&x_nml\n   a = 7 / ! done\n&y_nml\n"));
    }

    #[test]
    fn empty_one_line_group() {
        let nml = Namelist::parse("&empty_nml /\n").unwrap();
        assert_eq!(nml.group_names(), vec!["empty_nml"]);
        assert_eq!(nml.render(), "&empty_nml /\n");
    }

    #[test]
    fn one_line_group_with_entries() {
        let text = "&x_nml a = 1, path = '/a/b' /\n&y_nml\n   b = 2\n/\n";
        let nml = Namelist::parse(text).unwrap();
        assert_eq!(nml.group_names(), vec!["x_nml", "y_nml"]);
        assert_eq!(nml.get("x_nml", "a").as_deref(), Some("1"));
        assert_eq!(nml.get("x_nml", "path").as_deref(), Some("'/a/b'"));
        assert_eq!(nml.render(), text);

        let mut ov = Overrides::new();
        ov.set("x_nml", "path", "/c");
        ov.set("x_nml", "c", 3i64);
        let out = render_namelist(text, &ov).unwrap();
        assert!(out.starts_with("&x_nml a = 1, path = '/c'\n   c = 3 /\n&y_nml\n"), "{out}");
        let again = Namelist::parse(&out).unwrap();
        assert_eq!(again.get("x_nml", "c").as_deref(), Some("3"));
    }

    #[test]
    fn same_line_assignments_are_kept_apart() {
        let text = "&filter_nml\n   async = 0, ens_size = 3, cutoff = 0.2 ! tuned\n/\n";
        assert_eq!(render_namelist(text, &Overrides::new()).unwrap(), text);

        let mut ov = Overrides::new();
        ov.set("filter_nml", "async", 2i64);
        let out = render_namelist(text, &ov).unwrap();
        assert_eq!(out, "&filter_nml\n   async = 2, ens_size = 3, cutoff = 0.2 ! tuned\n/\n");

        let mut ov = Overrides::new();
        ov.set("filter_nml", "ens_size", 40i64);
        let out = render_namelist(text, &ov).unwrap();
        let nml = Namelist::parse(&out).unwrap();
        assert_eq!(nml.get("filter_nml", "async").as_deref(), Some("0"));
        assert_eq!(nml.get("filter_nml", "ens_size").as_deref(), Some("40"));
        assert_eq!(nml.get("filter_nml", "cutoff").as_deref(), Some("0.2"));
    }

    #[test]
    fn commas_inside_values_do_not_split() {
        let text = "&x_nml\n   pair = .true., .false., msg = 'a, b = c'\n   x(1, 2) = 5\n/\n";
        let nml = Namelist::parse(text).unwrap();
        assert_eq!(nml.get("x_nml", "pair").as_deref(), Some(".true., .false."));
        assert_eq!(nml.get("x_nml", "msg").as_deref(), Some("'a, b = c'"));
        assert_eq!(nml.get("x_nml", "x(1,2)").as_deref(), Some("5"));
        assert_eq!(nml.render(), text);
    }

    #[test]
    fn unterminated_group_is_an_error() {
        let err = Namelist::parse("&x_nml\n   a = 1\n").unwrap_err();
        assert!(matches!(err, CycleError::NamelistParse { .. }));
    }

    #[test]
    fn value_without_key_is_an_error() {
        let err = Namelist::parse("&x_nml\n   1, 2\n/\n").unwrap_err();
        assert!(matches!(err, CycleError::NamelistParse { line: 2, .. }));
    }
}
