//! 默认提示词表：按语言代码选择，显式传入的 prompt 优先

pub const PROMPT_DE: &str = "Beschreibe das Dokument detailliert.";
pub const PROMPT_EN: &str = "Describe the document in detail.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    De,
    En,
}

impl Lang {
    /// 未识别的语言代码一律回退到德语
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("en") => Lang::En,
            _ => Lang::De,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::De => "de",
            Lang::En => "en",
        }
    }

    pub fn default_prompt(&self) -> &'static str {
        match self {
            Lang::De => PROMPT_DE,
            Lang::En => PROMPT_EN,
        }
    }
}

/// 空字符串的 prompt 和缺失一样处理，走默认表
pub fn resolve_prompt(lang: Option<&str>, prompt: Option<&str>) -> String {
    match prompt {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => Lang::from_code(lang).default_prompt().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_german() {
        assert_eq!(resolve_prompt(None, None), PROMPT_DE);
    }

    #[test]
    fn english_default() {
        assert_eq!(resolve_prompt(Some("en"), None), PROMPT_EN);
    }

    #[test]
    fn unknown_lang_falls_back_to_german() {
        assert_eq!(resolve_prompt(Some("fr"), None), PROMPT_DE);
        assert_eq!(resolve_prompt(Some("EN"), None), PROMPT_DE);
        assert_eq!(resolve_prompt(Some(""), None), PROMPT_DE);
    }

    #[test]
    fn explicit_prompt_wins_regardless_of_lang() {
        for lang in [None, Some("de"), Some("en"), Some("xx")] {
            assert_eq!(resolve_prompt(lang, Some("Was steht hier?")), "Was steht hier?");
        }
    }

    #[test]
    fn explicit_prompt_is_kept_verbatim() {
        assert_eq!(resolve_prompt(None, Some("  spaced  ")), "  spaced  ");
    }

    #[test]
    fn empty_prompt_uses_default() {
        assert_eq!(resolve_prompt(Some("en"), Some("")), PROMPT_EN);
    }
}
