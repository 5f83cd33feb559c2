/*!
 * Stock phrases answered without a backend call.
 *
 * Greetings, short exclamations and common sound effects recur on nearly
 * every page. They are seeded into the cache at startup for the targets
 * listed here.
 */

/// One stock phrase and its translations
#[derive(Debug, Clone, Copy)]
pub struct CommonPhrase {
    /// ISO 639-1 code of the source text
    pub source_language: &'static str,
    pub text: &'static str,
    pub vietnamese: &'static str,
    pub english: &'static str,
    /// Sound effect lettering rather than speech
    pub is_sfx: bool,
}

const fn speech(source_language: &'static str, text: &'static str, vietnamese: &'static str, english: &'static str) -> CommonPhrase {
    CommonPhrase { source_language, text, vietnamese, english, is_sfx: false }
}

const fn sfx(source_language: &'static str, text: &'static str, vietnamese: &'static str, english: &'static str) -> CommonPhrase {
    CommonPhrase { source_language, text, vietnamese, english, is_sfx: true }
}

pub const COMMON_PHRASES: &[CommonPhrase] = &[
    // Japanese
    speech("ja", "はい", "Được", "Yes"),
    speech("ja", "いいえ", "Không", "No"),
    speech("ja", "すみません", "Xin lỗi", "Excuse me"),
    speech("ja", "ありがとう", "Cảm ơn", "Thank you"),
    speech("ja", "ありがとうございます", "Cảm ơn", "Thank you very much"),
    speech("ja", "こんにちは", "Xin chào", "Hello"),
    speech("ja", "おはよう", "Chào buổi sáng", "Good morning"),
    speech("ja", "おやすみ", "Chúc ngủ ngon", "Good night"),
    speech("ja", "そうですね", "Đúng vậy", "That's right"),
    speech("ja", "わかりました", "Tôi hiểu rồi", "Understood"),
    speech("ja", "がんばって", "Cố lên!", "Hang in there!"),
    speech("ja", "やった", "Làm được rồi!", "I did it!"),
    speech("ja", "すごい", "Tuyệt vời!", "Amazing!"),
    speech("ja", "待って", "Đợi đã", "Wait"),
    speech("ja", "助けて", "Giúp tôi", "Help me"),
    speech("ja", "なるほど", "Hiểu rồi", "I see"),
    speech("ja", "大丈夫", "Không sao đâu", "It's okay"),
    speech("ja", "危ない", "Nguy hiểm!", "Look out!"),
    speech("ja", "行こう", "Đi thôi!", "Let's go!"),
    speech("ja", "やめて", "Dừng lại!", "Stop it!"),
    // Chinese
    speech("zh", "你好", "Xin chào", "Hello"),
    speech("zh", "谢谢", "Cảm ơn", "Thank you"),
    speech("zh", "对不起", "Xin lỗi", "Sorry"),
    speech("zh", "不客气", "Không có gì", "You're welcome"),
    speech("zh", "再见", "Tạm biệt", "Goodbye"),
    speech("zh", "没问题", "Không vấn đề gì", "No problem"),
    speech("zh", "加油", "Cố lên!", "Go for it!"),
    speech("zh", "小心", "Cẩn thận", "Careful"),
    speech("zh", "救命", "Cứu tôi", "Help!"),
    speech("zh", "走吧", "Đi thôi!", "Let's go!"),
    speech("zh", "怎么了", "Sao vậy?", "What's wrong?"),
    // Korean
    speech("ko", "안녕하세요", "Xin chào", "Hello"),
    speech("ko", "감사합니다", "Cảm ơn", "Thank you"),
    speech("ko", "죄송합니다", "Xin lỗi", "I'm sorry"),
    speech("ko", "괜찮아요", "Không sao đâu", "It's okay"),
    speech("ko", "잠깐만요", "Chờ chút", "Just a moment"),
    speech("ko", "도와주세요", "Giúp tôi", "Please help me"),
    speech("ko", "가자", "Đi thôi!", "Let's go!"),
    speech("ko", "뭐야", "Cái gì vậy?", "What is it?"),
    // Sound effects
    sfx("ja", "バン", "BÙNG!", "BANG!"),
    sfx("ja", "ドン", "RẦM!", "BOOM!"),
    sfx("ja", "キラキラ", "lấp lánh", "sparkle"),
    sfx("ja", "ドキドキ", "thình thịch", "ba-dump"),
    sfx("ja", "ザー", "ào ào", "shaaa"),
    sfx("ja", "ゴゴゴ", "ầm ầm", "rumble"),
    sfx("zh", "轰", "BÙM!", "BOOM!"),
    sfx("zh", "砰", "ĐỤC!", "BAM!"),
    sfx("zh", "咔嚓", "KẮC!", "CRACK!"),
    sfx("ko", "쾅", "CẠCH!", "SLAM!"),
    sfx("ko", "쿵", "RẦM!", "THUD!"),
    sfx("ko", "두근두근", "thình thịch", "ba-dump"),
];

impl CommonPhrase {
    /// Translation into `target_language`, if the table carries one
    pub fn translation_for(&self, target_language: &str) -> Option<&'static str> {
        match target_language {
            "vi" => Some(self.vietnamese),
            "en" => Some(self.english),
            _ => None,
        }
    }
}
