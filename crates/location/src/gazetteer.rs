//! Places, prefectures and company-id hints, loaded from JSON at startup.

use std::path::Path;

use serde::Deserialize;
use tabi_core::{ConfigError, GeoPoint, LocationKind, LocationRecord};

use crate::geo::{haversine_km, Bounds};

const BUNDLED: &str = include_str!("../data/gazetteer.json");

#[derive(Debug, Clone, Deserialize)]
pub struct GazetteerPlace {
    pub key: String,
    pub city: String,
    pub prefecture: String,
    pub region: String,
    pub kind: LocationKind,
    pub english: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl GazetteerPlace {
    pub fn to_record(&self) -> LocationRecord {
        LocationRecord {
            city: self.city.clone(),
            prefecture: self.prefecture.clone(),
            region: self.region.clone(),
            postal_code: None,
            address: None,
            kind: self.kind,
        }
    }

    fn matches_exactly(&self, input: &str) -> bool {
        if self.key == input {
            return true;
        }
        let lower = input.to_lowercase();
        self.english.to_lowercase() == lower
            || self.aliases.iter().any(|alias| alias.to_lowercase() == lower)
    }

    fn appears_in(&self, input: &str) -> bool {
        if input.contains(self.key.as_str()) {
            return true;
        }
        let lower = input.to_lowercase();
        self.aliases
            .iter()
            .chain(std::iter::once(&self.english))
            .any(|alias| contains_alias(&lower, &alias.to_lowercase()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prefecture {
    pub name: String,
    pub region: String,
    /// JIS X 0401 code, 1..=47.
    pub code: u8,
    pub center: GeoPoint,
    pub lat_range: [f64; 2],
    pub lng_range: [f64; 2],
    pub romaji: String,
}

impl Prefecture {
    pub fn bounds(&self) -> Bounds {
        Bounds {
            lat_range: self.lat_range,
            lng_range: self.lng_range,
        }
    }

    /// 大分県 → 大分, 東京都 → 東京; 北海道 keeps its name.
    pub fn short_name(&self) -> &str {
        if self.name == "北海道" {
            return &self.name;
        }
        self.name
            .strip_suffix('県')
            .or_else(|| self.name.strip_suffix('府'))
            .or_else(|| self.name.strip_suffix('都'))
            .unwrap_or(&self.name)
    }

    /// Area code used by じゃらん's sightseeing search, e.g. `440000`.
    pub fn jalan_code(&self) -> String {
        format!("{:02}0000", self.code)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyHint {
    pub pattern: String,
    pub city: String,
    pub prefecture: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoCompany {
    pub company_id: String,
    pub city: String,
    pub prefecture: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultLocation {
    pub city: String,
    pub prefecture: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    Exact,
    Partial,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gazetteer {
    pub version: u32,
    pub places: Vec<GazetteerPlace>,
    pub prefectures: Vec<Prefecture>,
    pub company_hints: Vec<CompanyHint>,
    pub demo_companies: Vec<DemoCompany>,
    pub default_location: DefaultLocation,
    pub japan_bounds: Bounds,
    pub gps_radius_km: f64,
}

impl Gazetteer {
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_json(BUNDLED)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let gazetteer: Gazetteer = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            what: "gazetteer",
            source,
        })?;
        gazetteer.validate()?;
        Ok(gazetteer)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    pub fn prefecture(&self, name: &str) -> Option<&Prefecture> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.prefectures
            .iter()
            .find(|pref| pref.name == name || pref.short_name() == name)
    }

    pub fn region_of(&self, prefecture: &str) -> String {
        self.prefecture(prefecture)
            .map(|pref| pref.region.clone())
            .unwrap_or_else(|| self.default_location.region.clone())
    }

    /// Matches free-form user input: exact key or alias first, then a key or
    /// alias inside the text, then a prefecture name.
    pub fn match_input(&self, input: &str) -> Option<(LocationRecord, MatchStrength)> {
        let cleaned = input.trim();
        if cleaned.is_empty() {
            return None;
        }
        if let Some(place) = self.places.iter().find(|place| place.matches_exactly(cleaned)) {
            return Some((place.to_record(), MatchStrength::Exact));
        }
        if let Some(place) = self.places.iter().find(|place| place.appears_in(cleaned)) {
            return Some((place.to_record(), MatchStrength::Partial));
        }
        self.prefectures
            .iter()
            .find(|pref| cleaned.contains(pref.name.as_str()) || cleaned.contains(pref.short_name()))
            .map(|pref| {
                (
                    LocationRecord {
                        city: String::new(),
                        prefecture: pref.name.clone(),
                        region: pref.region.clone(),
                        postal_code: None,
                        address: None,
                        kind: LocationKind::Prefecture,
                    },
                    MatchStrength::Partial,
                )
            })
    }

    /// Nearest prefecture centre among the prefectures whose box contains the point.
    pub fn prefecture_at(&self, point: GeoPoint) -> Option<&Prefecture> {
        self.prefectures
            .iter()
            .filter(|pref| pref.bounds().contains(point))
            .min_by(|a, b| {
                haversine_km(point, a.center).total_cmp(&haversine_km(point, b.center))
            })
    }

    pub fn company_hint(&self, company_id: &str) -> Option<LocationRecord> {
        if let Some(demo) = self
            .demo_companies
            .iter()
            .find(|demo| demo.company_id == company_id)
        {
            return Some(LocationRecord {
                city: demo.city.clone(),
                prefecture: demo.prefecture.clone(),
                region: demo.region.clone(),
                postal_code: None,
                address: None,
                kind: LocationKind::DemoDefault,
            });
        }
        let lower = company_id.to_lowercase();
        self.company_hints
            .iter()
            .find(|hint| lower.contains(hint.pattern.as_str()))
            .map(|hint| LocationRecord {
                city: hint.city.clone(),
                prefecture: hint.prefecture.clone(),
                region: hint.region.clone(),
                postal_code: None,
                address: None,
                kind: LocationKind::IdHint,
            })
    }

    pub fn regional_default(&self) -> LocationRecord {
        LocationRecord {
            city: self.default_location.city.clone(),
            prefecture: self.default_location.prefecture.clone(),
            region: self.default_location.region.clone(),
            postal_code: None,
            address: None,
            kind: LocationKind::RegionalDefault,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.prefectures.is_empty() {
            return Err(ConfigError::Invalid {
                what: "gazetteer",
                message: "no prefectures defined".to_string(),
            });
        }
        if let Some(pref) = self
            .prefectures
            .iter()
            .find(|pref| pref.code == 0 || pref.code > 47)
        {
            return Err(ConfigError::Invalid {
                what: "gazetteer",
                message: format!("prefecture {} has code {}", pref.name, pref.code),
            });
        }
        if self.gps_radius_km <= 0.0 {
            return Err(ConfigError::Invalid {
                what: "gazetteer",
                message: "gps_radius_km must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ASCII aliases match on word boundaries so "uji" does not fire inside "fujiyama".
fn contains_alias(haystack: &str, alias: &str) -> bool {
    if alias.chars().count() < 2 {
        return false;
    }
    if !alias.is_ascii() {
        return haystack.contains(alias);
    }
    haystack.match_indices(alias).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(|ch| ch.is_ascii_alphanumeric())
            && !after.is_some_and(|ch| ch.is_ascii_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gazetteer() -> Gazetteer {
        Gazetteer::bundled().unwrap()
    }

    #[test]
    fn bundled_gazetteer_has_every_prefecture() {
        let gazetteer = gazetteer();
        assert_eq!(gazetteer.prefectures.len(), 47);
        let oita = gazetteer.prefecture("大分県").unwrap();
        assert_eq!(oita.jalan_code(), "440000");
        assert_eq!(oita.short_name(), "大分");
        assert_eq!(gazetteer.prefecture("北海道").unwrap().short_name(), "北海道");
    }

    #[test]
    fn exact_alias_match_ignores_case() {
        let (record, strength) = gazetteer().match_input("beppu").unwrap();
        assert_eq!(strength, MatchStrength::Exact);
        assert_eq!(record.city, "別府市");
        let (record, _) = gazetteer().match_input("벳푸").unwrap();
        assert_eq!(record.prefecture, "大分県");
    }

    #[test]
    fn substring_match_is_partial() {
        let (record, strength) = gazetteer().match_input("別府駅の近く").unwrap();
        assert_eq!(strength, MatchStrength::Partial);
        assert_eq!(record.city, "別府市");
        let (record, _) = gazetteer().match_input("near Kyoto station").unwrap();
        assert_eq!(record.city, "京都市");
    }

    #[test]
    fn tokyo_wins_over_kyoto_inside_tokyo_to() {
        let (record, _) = gazetteer().match_input("東京都内").unwrap();
        assert_eq!(record.prefecture, "東京都");
    }

    #[test]
    fn prefecture_fallback_match() {
        let (record, strength) = gazetteer().match_input("宮崎県のどこか").unwrap();
        assert_eq!(strength, MatchStrength::Partial);
        assert_eq!(record.kind, LocationKind::Prefecture);
        assert_eq!(record.region, "九州");
        assert!(gazetteer().match_input("Atlantis").is_none());
    }

    #[test]
    fn ascii_alias_needs_word_boundary() {
        assert!(!contains_alias("fujiyama", "uji"));
        assert!(contains_alias("trip to uji tomorrow", "uji"));
    }

    #[test]
    fn gps_point_maps_to_nearest_containing_prefecture() {
        let gazetteer = gazetteer();
        let beppu = GeoPoint::new(33.2846, 131.4914);
        assert_eq!(gazetteer.prefecture_at(beppu).unwrap().name, "大分県");
        let seoul = GeoPoint::new(37.5665, 126.978);
        assert!(gazetteer.prefecture_at(seoul).is_none());
    }

    #[test]
    fn company_hints_and_demo_company() {
        let gazetteer = gazetteer();
        let demo = gazetteer.company_hint("demo-company").unwrap();
        assert_eq!(demo.kind, LocationKind::DemoDefault);
        assert_eq!(demo.city, "別府市");
        let hinted = gazetteer.company_hint("Ryokan-Fukuoka-01").unwrap();
        assert_eq!(hinted.kind, LocationKind::IdHint);
        assert_eq!(hinted.city, "福岡市");
        assert!(gazetteer.company_hint("acme").is_none());
        assert_eq!(gazetteer.regional_default().city, "大分市");
    }
}
