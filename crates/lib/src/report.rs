//! Report and trivia prompt templates.
//!
//! The prompts are fixed Japanese templates; the user's keyword (or the
//! current date) is interpolated verbatim.

use chrono::NaiveDate;

/// Prefix of the fallback reply sent when generation fails; the error message
/// is appended after it.
pub const REPORT_ERROR_PREFIX: &str = "レポート生成エラー: ";

/// Greeting prepended to the daily trivia broadcast (overridable via config).
pub const DEFAULT_BROADCAST_GREETING: &str = "おはようございます！今日の豆知識をお届けします📅\n\n";

/// Build the report prompt for a user keyword. The keyword appears verbatim;
/// the template asks for overview, key points, facts, and related terms in a
/// 400-600 character Japanese report.
pub fn report_prompt(keyword: &str) -> String {
    format!(
        "「{keyword}」について以下の内容を含む簡潔なレポートを作成してください：\n\
         1. 概要（100文字程度）\n\
         2. 主な特徴や重要なポイント（3-5点）\n\
         3. 興味深い事実（2-3点）\n\
         4. 関連するキーワード（3-5個）\n\
         \n\
         レポートは日本語で、全体で400-600文字程度にまとめてください。"
    )
}

/// Format a calendar date the way the trivia prompt expects (e.g. 2026年8月31日).
pub fn format_japanese_date(date: NaiveDate) -> String {
    date.format("%Y年%-m月%-d日").to_string()
}

/// Build the daily trivia prompt for a given date.
pub fn trivia_prompt(date: NaiveDate) -> String {
    let date_str = format_japanese_date(date);
    format!(
        "今日は{date_str}です。この日付にちなんだ豆知識や歴史上の出来事を、\
         日本語で200文字程度の短い読み物として1つ紹介してください。"
    )
}

/// Prepend the broadcast greeting to the generated trivia text.
pub fn broadcast_text(greeting: Option<&str>, generated: &str) -> String {
    let greeting = greeting.unwrap_or(DEFAULT_BROADCAST_GREETING);
    format!("{greeting}{generated}")
}
