//! Categorical link derivation: which browsing paths a record shows up under.

use crate::shelf::config::LinkConfig;
use crate::shelf::normalize::{capitalize_words, normalize_segment};
use crate::shelf::record::{BibRecord, EntryType};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkCategory {
    Authors,
    Titles,
    Years,
    Keywords,
    Journals,
    Proceedings,
    TechReports,
    Books,
    Theses,
    Dois,
    PrePrints,
    Misc,
}

impl LinkCategory {
    pub const ALL: [LinkCategory; 12] = [
        Self::Authors,
        Self::Titles,
        Self::Years,
        Self::Keywords,
        Self::Journals,
        Self::Proceedings,
        Self::TechReports,
        Self::Books,
        Self::Theses,
        Self::Dois,
        Self::PrePrints,
        Self::Misc,
    ];

    /// Top-level directory name under the library root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Authors => "Authors",
            Self::Titles => "Titles",
            Self::Years => "Years",
            Self::Keywords => "Keywords",
            Self::Journals => "Journals",
            Self::Proceedings => "Proceedings",
            Self::TechReports => "Tech Reports",
            Self::Books => "Books",
            Self::Theses => "Theses",
            Self::Dois => "DOIs",
            Self::PrePrints => "Pre Prints",
            Self::Misc => "Misc",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for LinkCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let squashed: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| {
                category
                    .dir_name()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .eq_ignore_ascii_case(&squashed)
            })
            .ok_or_else(|| format!("unknown link category `{}`", s.trim()))
    }
}

impl Serialize for LinkCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.dir_name())
    }
}

impl<'de> Deserialize<'de> for LinkCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered path segments (category, subcategories, leaf name) before
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub segments: Vec<String>,
}

impl LinkSpec {
    fn new(category: LinkCategory, rest: Vec<String>) -> Self {
        let mut segments = Vec::with_capacity(rest.len() + 1);
        segments.push(category.dir_name().to_string());
        segments.extend(rest);
        Self { segments }
    }

    /// Normalized path relative to the library root, with `extension` on the
    /// leaf. `None` when any segment normalizes to nothing.
    pub fn relative_path(&self, extension: &str) -> Option<PathBuf> {
        let mut out = PathBuf::new();
        let last = self.segments.len().checked_sub(1)?;
        for (idx, raw) in self.segments.iter().enumerate() {
            let segment = normalize_segment(raw);
            if segment.is_empty() {
                return None;
            }
            if idx == last {
                out.push(format!("{segment}.{extension}"));
            } else {
                out.push(segment);
            }
        }
        Some(out)
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a BibTeX name list on top-level `and`.
fn split_names(list: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depth = 0i32;
    for token in list.split_whitespace() {
        if depth == 0 && token.eq_ignore_ascii_case("and") {
            if !current.is_empty() {
                names.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        depth += token.matches('{').count() as i32;
        depth -= token.matches('}').count() as i32;
        current.push(token);
    }
    if !current.is_empty() {
        names.push(current.join(" "));
    }
    names
        .into_iter()
        .filter(|n| !n.eq_ignore_ascii_case("others"))
        .collect()
}

/// `Smith, John` and `John Smith` both give `Smith`; a braced name is kept whole.
fn last_name(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('{') && name.ends_with('}') {
        return name.trim_matches(|c| c == '{' || c == '}').to_string();
    }
    if let Some((last, _)) = name.split_once(',') {
        return last.trim().to_string();
    }
    name.split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string()
}

fn year_of(record: &BibRecord) -> Option<String> {
    let raw = record.field("year").or_else(|| record.field("date"))?;
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.len() == 4 { Some(digits) } else { None }
}

fn title_of(record: &BibRecord) -> String {
    record
        .field("title")
        .map(collapse_whitespace)
        .unwrap_or_else(|| record.key.clone())
}

fn doi_parts(raw: &str) -> Vec<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if doi
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            doi = &doi[prefix.len()..];
        }
    }
    match doi.split_once('/') {
        Some((registrant, suffix)) => vec![registrant.to_string(), suffix.to_string()],
        None => vec![doi.to_string()],
    }
}

fn join_leaf(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .copied()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
}

struct Facts {
    people: Vec<String>,
    collaborations: Vec<String>,
    first: String,
    year: Option<String>,
    title: String,
}

impl Facts {
    fn of(record: &BibRecord) -> Self {
        let mut people = Vec::new();
        for field in ["author", "editor"] {
            if let Some(list) = record.field(field) {
                people.extend(split_names(list).iter().map(|n| last_name(n)));
            }
        }
        let collaborations = record
            .field("collaboration")
            .map(|raw| {
                raw.split(',')
                    .flat_map(split_names)
                    .map(|c| collapse_whitespace(&c))
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let first = people
            .first()
            .cloned()
            .or_else(|| record.field("collaboration").map(collapse_whitespace))
            .unwrap_or_else(|| "Anonymous".to_string());
        Self {
            people,
            collaborations,
            first,
            year: year_of(record),
            title: title_of(record),
        }
    }

    /// `<First> - <Year> - <Title>`, the leaf used where no other dimension
    /// is in the path.
    fn full_leaf(&self) -> String {
        join_leaf(&[
            Some(self.first.as_str()),
            self.year.as_deref(),
            Some(self.title.as_str()),
        ])
    }

    fn with_year(&self, mut segments: Vec<String>, leaf: String) -> Vec<String> {
        if let Some(year) = &self.year {
            segments.push(year.clone());
        }
        segments.push(leaf);
        segments
    }
}

fn derive_category(
    category: LinkCategory,
    record: &BibRecord,
    facts: &Facts,
    cfg: &LinkConfig,
) -> Vec<LinkSpec> {
    let mut out = Vec::new();
    match category {
        LinkCategory::Authors => {
            let leaf = join_leaf(&[facts.year.as_deref(), Some(facts.title.as_str())]);
            for person in facts.people.iter().chain(&facts.collaborations) {
                out.push(LinkSpec::new(category, vec![person.clone(), leaf.clone()]));
            }
        }
        LinkCategory::Titles => {
            let leaf = join_leaf(&[
                Some(facts.title.as_str()),
                Some(facts.first.as_str()),
                facts.year.as_deref(),
            ]);
            out.push(LinkSpec::new(category, vec![leaf]));
        }
        LinkCategory::Years => {
            if let Some(year) = &facts.year {
                let leaf = join_leaf(&[Some(facts.first.as_str()), Some(facts.title.as_str())]);
                out.push(LinkSpec::new(category, vec![year.clone(), leaf]));
            }
        }
        LinkCategory::Keywords => {
            let raw = record
                .field("keywords")
                .or_else(|| record.field("keyword"))
                .unwrap_or_default();
            for keyword in raw.split(|c| cfg.keyword_delimiters.contains(c)) {
                let keyword = collapse_whitespace(keyword);
                if keyword.is_empty() {
                    continue;
                }
                out.push(LinkSpec::new(
                    category,
                    vec![capitalize_words(&keyword), facts.full_leaf()],
                ));
            }
        }
        LinkCategory::Journals => {
            if let Some(journal) = record.field("journal") {
                let leaf = join_leaf(&[Some(facts.first.as_str()), Some(facts.title.as_str())]);
                let segments = facts.with_year(vec![collapse_whitespace(journal)], leaf);
                out.push(LinkSpec::new(category, segments));
            }
        }
        LinkCategory::Proceedings => {
            let is_paper = matches!(
                record.entry_type,
                EntryType::InProceedings | EntryType::Conference
            );
            if let (true, Some(venue)) = (is_paper, record.field("booktitle")) {
                let leaf = join_leaf(&[Some(facts.first.as_str()), Some(facts.title.as_str())]);
                let segments = facts.with_year(vec![collapse_whitespace(venue)], leaf);
                out.push(LinkSpec::new(category, segments));
            }
        }
        LinkCategory::TechReports => {
            if record.entry_type == EntryType::TechReport {
                let mut segments = Vec::new();
                if let Some(institution) = record.field("institution") {
                    segments.push(collapse_whitespace(institution));
                }
                segments.push(facts.full_leaf());
                out.push(LinkSpec::new(category, segments));
            }
        }
        LinkCategory::Books => {
            if matches!(
                record.entry_type,
                EntryType::Book
                    | EntryType::InBook
                    | EntryType::InCollection
                    | EntryType::Booklet
                    | EntryType::Proceedings
            ) {
                out.push(LinkSpec::new(category, vec![facts.full_leaf()]));
            }
        }
        LinkCategory::Theses => {
            if matches!(
                record.entry_type,
                EntryType::PhdThesis | EntryType::MastersThesis
            ) {
                let mut segments = Vec::new();
                if let Some(school) = record.field("school") {
                    segments.push(collapse_whitespace(school));
                }
                segments.push(facts.full_leaf());
                out.push(LinkSpec::new(category, segments));
            }
        }
        LinkCategory::Dois => {
            if let Some(doi) = record.field("doi") {
                out.push(LinkSpec::new(category, doi_parts(doi)));
            }
        }
        LinkCategory::PrePrints => {
            if let Some(eprint) = record.field("eprint") {
                let archive = record
                    .field("archiveprefix")
                    .or_else(|| record.field("eprinttype"))
                    .unwrap_or("arXiv");
                out.push(LinkSpec::new(
                    category,
                    vec![archive.to_string(), eprint.to_string()],
                ));
            }
        }
        LinkCategory::Misc => {
            if matches!(
                record.entry_type,
                EntryType::Misc | EntryType::Unpublished | EntryType::Online | EntryType::Manual
            ) {
                out.push(LinkSpec::new(category, vec![facts.full_leaf()]));
            }
        }
    }
    out
}

/// Every link spec for `record` across the enabled categories.
pub fn derive_link_specs(record: &BibRecord, cfg: &LinkConfig) -> Vec<LinkSpec> {
    let facts = Facts::of(record);
    cfg.categories
        .iter()
        .flat_map(|category| derive_category(*category, record, &facts, cfg))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widgets() -> BibRecord {
        BibRecord::new(EntryType::Article, "Smith2020")
            .with_field("author", "Smith, J.")
            .with_field("title", "A Study Of Widgets")
            .with_field("year", "2020")
            .with_field("keyword", "widgets")
    }

    fn paths(record: &BibRecord, cfg: &LinkConfig) -> Vec<String> {
        derive_link_specs(record, cfg)
            .iter()
            .filter_map(|spec| spec.relative_path("pdf"))
            .map(|p| p.display().to_string())
            .collect()
    }

    #[test]
    fn article_fans_out_over_dimensions() {
        let got = paths(&widgets(), &LinkConfig::default());
        assert_eq!(
            got,
            vec![
                "Authors/Smith/2020 - A Study Of Widgets.pdf",
                "Titles/A Study Of Widgets - Smith - 2020.pdf",
                "Years/2020/Smith - A Study Of Widgets.pdf",
                "Keywords/Widgets/Smith - 2020 - A Study Of Widgets.pdf",
            ]
        );
    }

    #[test]
    fn name_lists_split_on_top_level_and() {
        assert_eq!(
            split_names("Smith, John and Jane Doe and {Barnes and Noble} and others"),
            vec!["Smith, John", "Jane Doe", "{Barnes and Noble}"]
        );
        assert_eq!(last_name("Jane Doe"), "Doe");
        assert_eq!(last_name("{Barnes and Noble}"), "Barnes and Noble");
    }

    #[test]
    fn identifiers_and_venues_get_their_own_trees() {
        let record = BibRecord::new(EntryType::InProceedings, "Doe2019")
            .with_field("author", "Jane Doe")
            .with_field("title", "Fast Things")
            .with_field("year", "2019")
            .with_field("booktitle", "Proc. of SOSP")
            .with_field("doi", "https://doi.org/10.1145/1234.5678")
            .with_field("eprint", "1901.00001");
        let cfg = LinkConfig {
            categories: vec![
                LinkCategory::Proceedings,
                LinkCategory::Dois,
                LinkCategory::PrePrints,
            ],
            ..LinkConfig::default()
        };
        assert_eq!(
            paths(&record, &cfg),
            vec![
                "Proceedings/Proc. of SOSP/2019/Doe - Fast Things.pdf",
                "DOIs/10.1145/1234.5678.pdf",
                "Pre Prints/arXiv/1901.00001.pdf",
            ]
        );
    }

    #[test]
    fn keywords_split_on_every_delimiter() {
        let record = widgets().with_field("keywords", "dark matter; x-ray, ,lensing");
        let cfg = LinkConfig {
            categories: vec![LinkCategory::Keywords],
            ..LinkConfig::default()
        };
        let got = paths(&record, &cfg);
        assert_eq!(got.len(), 3);
        assert!(got[0].starts_with("Keywords/Dark Matter/"));
        assert!(got[1].starts_with("Keywords/X-Ray/"));
        assert!(got[2].starts_with("Keywords/Lensing/"));
    }

    #[test]
    fn unusable_segments_drop_the_spec() {
        let spec = LinkSpec::new(LinkCategory::Authors, vec!["???".into(), "x".into()]);
        assert_eq!(spec.relative_path("pdf"), None);
    }

    #[test]
    fn category_names_parse_loosely() {
        assert_eq!("tech reports".parse::<LinkCategory>(), Ok(LinkCategory::TechReports));
        assert_eq!("PrePrints".parse::<LinkCategory>(), Ok(LinkCategory::PrePrints));
        assert_eq!("dois".parse::<LinkCategory>(), Ok(LinkCategory::Dois));
        assert!("nope".parse::<LinkCategory>().is_err());
    }
}
