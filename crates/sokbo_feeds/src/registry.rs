use std::collections::{BTreeSet, HashSet};

use sokbo_core::{Error, FeedSource, NewsCategory, Result};

/// Curated feed table, read-only after load. Keyed by RSS URL.
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    sources: Vec<FeedSource>,
}

impl FeedRegistry {
    /// Builds a registry from the given sources. Duplicate RSS URLs are
    /// collapsed (first entry wins). Every category named by at least one
    /// source must survive the collapse with a feed, and the table must not
    /// be empty.
    pub fn new(sources: Vec<FeedSource>) -> Result<Self> {
        let declared: HashSet<NewsCategory> = sources.iter().map(|s| s.category).collect();

        let mut seen = HashSet::new();
        let mut collapsed = Vec::new();
        for source in sources {
            if seen.insert(source.rss_url.clone()) {
                collapsed.push(source);
            }
        }

        if collapsed.is_empty() {
            return Err(Error::Config("feed registry is empty".to_string()));
        }
        let surviving: HashSet<NewsCategory> = collapsed.iter().map(|s| s.category).collect();
        for category in declared {
            if !surviving.contains(&category) {
                return Err(Error::Config(format!(
                    "no feed left for category {} after collapsing duplicates",
                    category
                )));
            }
        }

        Ok(Self { sources: collapsed })
    }

    /// The built-in Korean news source table.
    pub fn curated() -> Result<Self> {
        Self::new(default_sources())
    }

    pub fn list(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn by_category(&self, category: NewsCategory) -> Vec<&FeedSource> {
        self.sources
            .iter()
            .filter(|s| s.category == category)
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .map(|s| s.category.as_str().to_string())
            .collect()
    }

    pub fn by_url(&self, rss_url: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.rss_url == rss_url)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn source(name: &str, category: NewsCategory, rss_url: &str) -> FeedSource {
    FeedSource {
        name: name.to_string(),
        category,
        rss_url: rss_url.to_string(),
    }
}

/// Korean outlets by section. Wire services carry general news.
pub fn default_sources() -> Vec<FeedSource> {
    use NewsCategory::*;
    vec![
        // Dailies
        source("한겨레", General, "http://www.hani.co.kr/rss/"),
        source("조선일보", General, "https://www.chosun.com/arc/outboundfeeds/rss/"),
        source("중앙일보", General, "https://rss.joins.com/joins_news_list.xml"),
        source("동아일보", General, "https://rss.donga.com/total.xml"),
        source("경향신문", General, "http://www.khan.co.kr/rss/rssdata/total_news.xml"),
        // Wire services
        source("연합뉴스", General, "https://www.yna.co.kr/rss/news.xml"),
        source("뉴스1", General, "https://www.news1.kr/rss/news.xml"),
        // Tech press
        source("ZDNet Korea", It, "https://www.zdnet.co.kr/news/news_list_rss.asp"),
        source("전자신문", It, "https://www.etnews.com/rss/news.xml"),
        source("디지털타임스", It, "https://www.dt.co.kr/rss/news.xml"),
        source("아이뉴스24", It, "https://www.inews24.com/rss/allnews.xml"),
        source("블로터", It, "https://www.bloter.net/feed/"),
        // Business press
        source("한국경제", Economy, "https://www.hankyung.com/feed/all-news"),
        source("매일경제", Economy, "https://www.mk.co.kr/rss/30000001/"),
        source("서울경제", Economy, "https://www.sedaily.com/RSS/S1N1.xml"),
        source("SBS 경제", Economy, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=03"),
        source("JTBC 경제", Economy, "https://fs.jtbc.co.kr/RSS/economy.xml"),
        // Broadcasters, headline feeds
        source("SBS", Broadcast, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=01"),
        source("MBC", Broadcast, "https://imnews.imbc.com/rss/news.xml"),
        source("KBS", Broadcast, "http://world.kbs.co.kr/rss/rss_news.htm?lang=k"),
        source("YTN", Broadcast, "https://www.ytn.co.kr/_comm/rss_list.php"),
        source("JTBC", Broadcast, "https://news.jtbc.joins.com/rss/news.xml"),
        // Sections
        source("SBS 정치", Politics, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=02"),
        source("JTBC 정치", Politics, "https://fs.jtbc.co.kr/RSS/politics.xml"),
        source("연합뉴스 정치", Politics, "https://www.yonhapnews.co.kr/rss/politics.xml"),
        source("SBS 사회", Society, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=07"),
        source("JTBC 사회", Society, "https://fs.jtbc.co.kr/RSS/society.xml"),
        source("SBS 문화", Culture, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=08"),
        source("JTBC 문화", Culture, "https://fs.jtbc.co.kr/RSS/culture.xml"),
        source("SBS 국제", International, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=04"),
        source("JTBC 국제", International, "https://fs.jtbc.co.kr/RSS/international.xml"),
        source("JTBC 연예", Entertainment, "https://fs.jtbc.co.kr/RSS/entertainment.xml"),
        source("SBS 연예", Entertainment, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=14"),
        source("SBS 스포츠", Sports, "https://news.sbs.co.kr/news/SectionRssFeed.do?sectionId=09"),
        source("JTBC 스포츠", Sports, "https://fs.jtbc.co.kr/RSS/sports.xml"),
        source("정책브리핑", Government, "https://www.korea.kr/rss/policy.xml"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_registry_loads() {
        let registry = FeedRegistry::curated().unwrap();
        assert!(!registry.is_empty());
        // Every category in the enum has at least one curated feed.
        for category in NewsCategory::ALL {
            assert!(
                !registry.by_category(*category).is_empty(),
                "no feed for {}",
                category
            );
        }
    }

    #[test]
    fn duplicate_urls_are_collapsed() {
        let registry = FeedRegistry::new(vec![
            source("a", NewsCategory::General, "https://example.com/rss"),
            source("b", NewsCategory::General, "https://example.com/rss"),
            source("c", NewsCategory::It, "https://example.com/it"),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.by_url("https://example.com/rss").unwrap().name, "a");
    }

    #[test]
    fn empty_registry_is_a_config_error() {
        assert!(FeedRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn categories_reflect_the_table() {
        let registry = FeedRegistry::new(vec![
            source("a", NewsCategory::General, "https://example.com/rss"),
            source("c", NewsCategory::It, "https://example.com/it"),
        ])
        .unwrap();
        let categories = registry.categories();
        assert!(categories.contains("general"));
        assert!(categories.contains("it"));
        assert!(!categories.contains("sports"));
    }
}
