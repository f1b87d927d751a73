//! Search links into Japanese travel and dining sites, built from the resolved
//! location and the guest's question.

use std::sync::Arc;

use tabi_core::{LangCode, LocationRecord, SpecializedLink};
use tabi_location::Gazetteer;
use url::Url;

const FALLBACK_JALAN_CODE: &str = "440000";
const MAX_KEYWORD_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkIntent {
    Tourism,
    Restaurant,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Jalan,
    GoogleMaps,
    Gurunavi,
    Tabelog,
}

struct SiteSpec {
    site: Site,
    name: &'static str,
    priority: u8,
    japanese_only: bool,
}

const TOURISM_SITES: &[SiteSpec] = &[
    SiteSpec {
        site: Site::Jalan,
        name: "🗾 観光情報（じゃらん）",
        priority: 1,
        japanese_only: true,
    },
    SiteSpec {
        site: Site::GoogleMaps,
        name: "🗺️ 地図情報（Google Maps）",
        priority: 2,
        japanese_only: false,
    },
];

const RESTAURANT_SITES: &[SiteSpec] = &[
    SiteSpec {
        site: Site::Gurunavi,
        name: "🍽️ グルメ情報（ぐるなび）",
        priority: 1,
        japanese_only: false,
    },
    SiteSpec {
        site: Site::Tabelog,
        name: "⭐ レストラン口コミ（食べログ）",
        priority: 2,
        japanese_only: true,
    },
];

pub struct LinkBuilder {
    gazetteer: Arc<Gazetteer>,
}

impl LinkBuilder {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    /// Links for `intent`, filtered to the sites usable in `language` and
    /// ordered by priority. Mixed interleaves both site families.
    pub fn links(
        &self,
        intent: LinkIntent,
        location: &LocationRecord,
        query: &str,
        language: LangCode,
    ) -> Vec<SpecializedLink> {
        let mut specs: Vec<&SiteSpec> = match intent {
            LinkIntent::Tourism => TOURISM_SITES.iter().collect(),
            LinkIntent::Restaurant => RESTAURANT_SITES.iter().collect(),
            LinkIntent::Mixed => TOURISM_SITES.iter().chain(RESTAURANT_SITES).collect(),
        };
        specs.sort_by_key(|spec| spec.priority);

        let keyword = search_keyword(query);
        specs
            .into_iter()
            .filter(|spec| language == LangCode::Ja || !spec.japanese_only)
            .filter_map(|spec| {
                self.url_for(spec.site, location, &keyword)
                    .map(|url| SpecializedLink {
                        name: spec.name.to_string(),
                        url,
                    })
            })
            .collect()
    }

    fn url_for(&self, site: Site, location: &LocationRecord, keyword: &str) -> Option<String> {
        let prefecture = self.gazetteer.prefecture(&location.prefecture);
        let city = location.city.trim();

        let url = match site {
            Site::Jalan => {
                let code = prefecture
                    .map(|pref| pref.jalan_code())
                    .unwrap_or_else(|| FALLBACK_JALAN_CODE.to_string());
                let mut url = Url::parse("https://www.jalan.net/kankou/").ok()?;
                url.path_segments_mut()
                    .ok()?
                    .pop_if_empty()
                    .push(&code)
                    .push("");
                url.query_pairs_mut()
                    .append_pair("screenId", "OUW1021")
                    .append_pair("keyword", keyword);
                url
            }
            Site::GoogleMaps => {
                let area = match (city.is_empty(), location.prefecture.trim().is_empty()) {
                    (false, false) => format!("{},{}", city, location.prefecture.trim()),
                    (false, true) => city.to_string(),
                    (true, false) => location.prefecture.trim().to_string(),
                    (true, true) => "日本".to_string(),
                };
                let mut url = Url::parse("https://www.google.com/maps/search/").ok()?;
                url.path_segments_mut()
                    .ok()?
                    .pop_if_empty()
                    .push(&format!("{keyword}+{area}"));
                url
            }
            Site::Gurunavi if !city.is_empty() => {
                let mut url = Url::parse("https://r.gnavi.co.jp/area/jp/rs/").ok()?;
                url.query_pairs_mut()
                    .append_pair("fwp", city)
                    .append_pair("fw", keyword);
                url
            }
            Site::Gurunavi => {
                let mut url = Url::parse("https://r.gnavi.co.jp/search/").ok()?;
                url.query_pairs_mut().append_pair("fw", keyword);
                url
            }
            Site::Tabelog => {
                let area = prefecture
                    .map(|pref| pref.romaji.as_str())
                    .unwrap_or("japan");
                let mut url = Url::parse("https://tabelog.com/").ok()?;
                url.path_segments_mut()
                    .ok()?
                    .pop_if_empty()
                    .push(area)
                    .push("rstLst")
                    .push("");
                url.query_pairs_mut().append_pair("word", keyword);
                url
            }
        };
        Some(url.into())
    }
}

/// `• **[name](url)**` lines for the first `limit` links.
pub fn link_lines(links: &[SpecializedLink], limit: usize) -> String {
    links
        .iter()
        .take(limit)
        .map(|link| format!("• **[{}]({})**", link.name, link.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The question with sentence punctuation removed, capped for use in a URL.
pub fn search_keyword(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|ch| match ch {
            '？' | '?' | '。' | '！' | '!' | '、' | ',' | '，' | '.' => ' ',
            other => other,
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_KEYWORD_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabi_core::LocationKind;

    fn builder() -> LinkBuilder {
        LinkBuilder::new(Arc::new(Gazetteer::bundled().unwrap()))
    }

    fn beppu() -> LocationRecord {
        LocationRecord {
            city: "別府市".to_string(),
            prefecture: "大分県".to_string(),
            region: "九州".to_string(),
            postal_code: None,
            address: None,
            kind: LocationKind::City,
        }
    }

    #[test]
    fn tourism_links_for_japanese_guest() {
        let links = builder().links(LinkIntent::Tourism, &beppu(), "温泉", LangCode::Ja);
        assert_eq!(links.len(), 2);
        assert!(links[0].name.contains("じゃらん"));
        assert!(links[0]
            .url
            .starts_with("https://www.jalan.net/kankou/440000/?screenId=OUW1021&keyword=%E6%B8%A9%E6%B3%89"));
        assert!(links[1].url.starts_with("https://www.google.com/maps/search/"));
        assert!(links[1].url.contains("%E5%88%A5%E5%BA%9C%E5%B8%82"));
    }

    #[test]
    fn japanese_only_sites_are_dropped_for_other_languages() {
        let links = builder().links(LinkIntent::Tourism, &beppu(), "onsen", LangCode::En);
        assert_eq!(links.len(), 1);
        assert!(links[0].name.contains("Google Maps"));

        let links = builder().links(LinkIntent::Restaurant, &beppu(), "ramen", LangCode::Ko);
        assert_eq!(links.len(), 1);
        assert!(links[0].url.starts_with("https://r.gnavi.co.jp/area/jp/rs/?fwp="));
    }

    #[test]
    fn restaurant_links_use_prefecture_romaji() {
        let links = builder().links(LinkIntent::Restaurant, &beppu(), "とり天", LangCode::Ja);
        assert_eq!(links.len(), 2);
        assert!(links[1].url.starts_with("https://tabelog.com/oita/rstLst/?word="));
    }

    #[test]
    fn mixed_links_are_ordered_by_priority() {
        let links = builder().links(LinkIntent::Mixed, &beppu(), "観光とランチ", LangCode::Ja);
        let names: Vec<&str> = links.iter().map(|link| link.name.as_str()).collect();
        assert_eq!(names.len(), 4);
        assert!(names[0].contains("じゃらん"));
        assert!(names[1].contains("ぐるなび"));
        assert!(names[2].contains("Google Maps"));
        assert!(names[3].contains("食べログ"));
    }

    #[test]
    fn unknown_prefecture_falls_back_to_defaults() {
        let location = LocationRecord {
            city: String::new(),
            prefecture: String::new(),
            region: "九州".to_string(),
            postal_code: None,
            address: None,
            kind: LocationKind::RegionalDefault,
        };
        let links = builder().links(LinkIntent::Mixed, &location, "おすすめ", LangCode::Ja);
        assert!(links.iter().any(|link| link.url.contains("/kankou/440000/")));
        assert!(links.iter().any(|link| link.url.contains("tabelog.com/japan/rstLst/")));
        assert!(links
            .iter()
            .any(|link| link.url.starts_with("https://r.gnavi.co.jp/search/?fw=")));
        assert!(links.iter().any(|link| link.url.contains("%E6%97%A5%E6%9C%AC")));
    }

    #[test]
    fn keyword_drops_punctuation() {
        assert_eq!(search_keyword("周辺でおすすめのレストランは？"), "周辺でおすすめのレストランは");
        assert_eq!(search_keyword("Any good  ramen, nearby?"), "Any good ramen nearby");
    }

    #[test]
    fn link_lines_respect_limit() {
        let links = builder().links(LinkIntent::Mixed, &beppu(), "温泉", LangCode::Ja);
        let lines = link_lines(&links, 2);
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.starts_with("• **[🗾 観光情報（じゃらん）]("));
    }
}
