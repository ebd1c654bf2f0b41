use sokbo_core::NewsCategory;

/// Category cue words, Korean and English. The body is only consulted for
/// its first 500 characters.
const CATEGORY_KEYWORDS: &[(NewsCategory, &[&str])] = &[
    (
        NewsCategory::Politics,
        &[
            "정치", "대통령", "국회", "의원", "선거", "정당", "여당", "야당", "politics",
            "president", "congress", "election", "parliament",
        ],
    ),
    (
        NewsCategory::Economy,
        &[
            "경제", "금융", "주식", "시장", "기업", "투자", "부동산", "금리", "수출", "economy",
            "finance", "stock", "market", "investment", "inflation",
        ],
    ),
    (
        NewsCategory::It,
        &[
            "기술", "인공지능", "반도체", "컴퓨터", "소프트웨어", "디지털", "스마트폰",
            "technology", "artificial intelligence", "semiconductor", "software", "chip", " ai ",
        ],
    ),
    (
        NewsCategory::Sports,
        &[
            "스포츠", "축구", "야구", "농구", "올림픽", "월드컵", "선수", "sports", "football",
            "soccer", "baseball", "olympics",
        ],
    ),
    (
        NewsCategory::Culture,
        &[
            "문화", "영화", "드라마", "음악", "예술", "전시", "공연", "축제", "culture", "movie",
            "film", "music", "art", "festival",
        ],
    ),
    (
        NewsCategory::Society,
        &[
            "사회", "사건", "경찰", "법원", "재판", "교육", "복지", "society", "police", "court",
            "welfare", "education",
        ],
    ),
    (
        NewsCategory::International,
        &[
            "국제", "외교", "미국", "중국", "일본", "유럽", "international", "diplomacy",
            "foreign", "global",
        ],
    ),
    (
        NewsCategory::Entertainment,
        &[
            "연예", "아이돌", "배우", "가수", "예능", "entertainment", "celebrity", "idol",
        ],
    ),
    (
        NewsCategory::Government,
        &[
            "정책", "정부", "부처", "행정", "지자체", "government", "policy", "ministry",
        ],
    ),
];

const BODY_WINDOW: usize = 500;

/// Picks the category whose cue words score highest over title and the start
/// of the body. Returns `None` when nothing matches.
pub fn categorize(title: &str, body: &str) -> Option<NewsCategory> {
    let window: String = body.chars().take(BODY_WINDOW).collect();
    let haystack = format!(" {} {} ", title, window).to_lowercase();

    let mut best: Option<(NewsCategory, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords
            .iter()
            .filter(|keyword| haystack.contains(&keyword.to_lowercase()))
            .count();
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((*category, score));
        }
    }
    best.map(|(category, _)| category)
}
