/*!
 * Heuristic reading of source texts for prompt hints.
 *
 * Keyword and punctuation counts give the backend a rough idea of tone,
 * register and content before it sees the lines. The hints are advisory and
 * never change the cache key.
 */

/// Minimum share of a batch that must show a trait before it is mentioned
const MOOD_SHARE: f64 = 0.3;
const SFX_SHARE: f64 = 0.2;
const GENRE_SHARE: f64 = 0.25;
const DIALOGUE_SHARE: f64 = 0.7;

const JOYFUL: &[&str] = &["笑", "うれし", "嬉しい", "楽しい", "ハハ", "开心", "기쁘", "호호", "haha", "happy"];
const ANGRY: &[&str] = &["怒", "むかつく", "腹立", "クソ", "畜生", "화나", "젠장", "damn", "angry"];
const SAD: &[&str] = &["悲", "泣", "哭", "슬프", "sad", "crying"];
const SURPRISED: &[&str] = &["驚", "びっくり", "えっ", "まさか", "헉", "놀라", "surprise"];
const SCARED: &[&str] = &["怖", "こわい", "恐ろしい", "무서", "scared", "scary"];

const POLITE: &[&str] = &["です", "ます", "ございます", "습니다", "십시오", "您"];
const CASUAL: &[&str] = &["だよ", "だね", "じゃん", "っす", "呢", "哦", "야"];

const SOUND_EFFECTS: &[&str] = &[
    "ドン", "バン", "ゴゴゴ", "ドキドキ", "キラキラ", "轰", "砰", "咔嚓", "嘭", "쾅", "쿵", "휘익", "BANG", "BOOM", "CRASH",
];

const ACTION: &[&str] = &["戦", "戰", "战斗", "싸우", "fight", "battle", "attack"];
const ROMANCE: &[&str] = &["愛", "恋", "好き", "사랑", "love", "kiss"];
const COMEDY: &[&str] = &["笑", "面白い", "웃긴", "funny", "joke"];

const DIALOGUE_MARKS: &[&str] = &["!", "?", "…", "。", "！", "？"];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn emotion_of(text: &str) -> Option<&'static str> {
    [
        (JOYFUL, "joyful"),
        (ANGRY, "angry"),
        (SAD, "sad"),
        (SURPRISED, "surprised"),
        (SCARED, "scared"),
    ]
    .into_iter()
    .find(|(keywords, _)| contains_any(text, keywords))
    .map(|(_, emotion)| emotion)
}

/// Hints for a single text, `None` when nothing stands out
pub fn analyze_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.chars().count() < 2 {
        return None;
    }

    let mut hints = Vec::new();
    if let Some(emotion) = emotion_of(text) {
        hints.push(format!("sounds {}", emotion));
    }

    if text.contains('!') || text.contains('！') {
        hints.push("exclaimed".to_string());
    } else if text.ends_with('?') || text.ends_with('？') {
        hints.push("a question".to_string());
    }
    if text.contains('…') || text.contains("...") {
        hints.push("hesitant, keep the trailing off".to_string());
    }

    if contains_any(text, POLITE) {
        hints.push("polite register".to_string());
    } else if contains_any(text, CASUAL) {
        hints.push("casual register".to_string());
    }

    if contains_any(text, SOUND_EFFECTS) {
        hints.push("contains a sound effect".to_string());
    }
    if (text.starts_with('（') && text.ends_with('）')) || (text.starts_with('(') && text.ends_with(')')) {
        hints.push("bracketed, likely an inner thought".to_string());
    }

    if hints.is_empty() {
        None
    } else {
        Some(hints.join(", "))
    }
}

/// Hints describing a whole batch, `None` when nothing stands out
pub fn analyze_batch(texts: &[&str]) -> Option<String> {
    if texts.is_empty() {
        return None;
    }

    let total = texts.len() as f64;
    let share = |predicate: &dyn Fn(&str) -> bool| texts.iter().filter(|text| predicate(**text)).count() as f64 / total;
    let mut hints: Vec<&str> = Vec::new();

    let average_length = texts.iter().map(|text| text.chars().count()).sum::<usize>() as f64 / total;
    if average_length > 30.0 {
        hints.push("long lines");
    } else if average_length < 10.0 {
        hints.push("short lines, keep translations terse");
    }

    let upbeat = share(&|text| contains_any(text, JOYFUL));
    let tense = share(&|text| !contains_any(text, JOYFUL) && (contains_any(text, ANGRY) || contains_any(text, SAD)));
    if upbeat > MOOD_SHARE && upbeat > tense {
        hints.push("mostly upbeat tone");
    } else if tense > MOOD_SHARE && tense > upbeat {
        hints.push("mostly tense or sad tone");
    }

    let polite = share(&|text| contains_any(text, POLITE));
    let casual = share(&|text| !contains_any(text, POLITE) && contains_any(text, CASUAL));
    if polite > MOOD_SHARE && polite > casual {
        hints.push("mostly polite speech");
    } else if casual > MOOD_SHARE && casual > polite {
        hints.push("mostly casual speech");
    }

    if share(&|text| contains_any(text, SOUND_EFFECTS)) > SFX_SHARE {
        hints.push("many sound effects");
    }
    if share(&|text| contains_any(text, ACTION)) > GENRE_SHARE {
        hints.push("action scene");
    }
    if share(&|text| contains_any(text, ROMANCE)) > GENRE_SHARE {
        hints.push("romantic scene");
    }
    if share(&|text| contains_any(text, COMEDY)) > GENRE_SHARE {
        hints.push("comedic scene");
    }

    let dialogue = share(&|text| contains_any(text, DIALOGUE_MARKS));
    if dialogue > DIALOGUE_SHARE {
        hints.push("mostly dialogue");
    } else if dialogue < 1.0 - DIALOGUE_SHARE {
        hints.push("mostly narration or captions");
    }

    if hints.is_empty() {
        None
    } else {
        Some(hints.join(", "))
    }
}
