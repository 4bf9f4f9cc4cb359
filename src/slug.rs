//! Slugs with transliteration, used for catalog slugs and trial answer comparison.
//!
//! Example:
//!   input : "Доброе утро, 中国!"
//!   output: "dobroe-utro-zhong-guo"
//!
//! Cyrillic goes through a fixed table, Hanzi through toneless pinyin (one
//! word per character). Whitespace and '-' separate words; other punctuation
//! is dropped without separating, so "don't" becomes "dont".
use pinyin::ToPinyin;

fn cyrillic_to_latin(ch: char) -> Option<&'static str> {
  let latin = match ch {
    'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'д' => "d", 'е' => "e", 'ё' => "yo",
    'ж' => "zh", 'з' => "z", 'и' => "i", 'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m",
    'н' => "n", 'о' => "o", 'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t", 'у' => "u",
    'ф' => "f", 'х' => "h", 'ц' => "ts", 'ч' => "ch", 'ш' => "sh", 'щ' => "sch", 'ъ' => "",
    'ы' => "y", 'ь' => "", 'э' => "e", 'ю' => "yu", 'я' => "ya",
    'і' => "i", 'ї' => "yi", 'є' => "ye", 'ґ' => "g",
    _ => return None,
  };
  Some(latin)
}

fn push_piece(out: &mut String, pending_dash: &mut bool, piece: &str) {
  if piece.is_empty() {
    return;
  }
  if *pending_dash && !out.is_empty() {
    out.push('-');
  }
  *pending_dash = false;
  out.push_str(piece);
}

/// Lowercased, transliterated, dash-separated slug.
pub fn slugify(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut pending_dash = false;

  for ch in text.chars().flat_map(char::to_lowercase) {
    if ch.is_whitespace() || ch == '-' {
      pending_dash = true;
    } else if let Some(latin) = cyrillic_to_latin(ch) {
      push_piece(&mut out, &mut pending_dash, latin);
    } else if let Some(py) = ch.to_pinyin() {
      pending_dash = true;
      push_piece(&mut out, &mut pending_dash, py.plain());
      pending_dash = true;
    } else if ch.is_alphanumeric() || ch == '_' {
      let mut buf = [0u8; 4];
      push_piece(&mut out, &mut pending_dash, ch.encode_utf8(&mut buf));
    }
  }

  out.trim_matches('_').to_string()
}

/// Canonical form of a free-text answer: trimmed, case-folded, slugified.
pub fn normalize_answer(text: &str) -> String {
  slugify(&text.trim().to_lowercase())
}
