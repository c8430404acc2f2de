use std::fmt;

use serde::{Deserialize, Serialize};

/// 把一个词形切分成片段（字符、子词等），供字符级循环网络使用。
/// 数字编码与超参数文件中的`char rnn`一致（0表示不使用字符级网络）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tokenizer {
    /// 每个字符一个片段
    Char,
    /// 按"__"切分（数据须预先处理成这种格式）
    Token,
    /// 首字符 + 末尾至多3个字符
    Suffix,
    /// 少于8个字符时同`Char`；否则为首字符、中间部分，以及末尾5个字符各自一个片段
    LazyChar,
}

/// `LazyChar`逐字符保留的末尾长度
const LAZY_TAIL: usize = 5;
/// `LazyChar`开始合并中间部分的最短词长
const LAZY_MIN_LEN: usize = 8;
/// `Suffix`保留的后缀长度
const SUFFIX_LEN: usize = 3;

impl Tokenizer {
    pub fn code(&self) -> usize {
        match self {
            Self::Char => 1,
            Self::Token => 2,
            Self::Suffix => 3,
            Self::LazyChar => 4,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        match code {
            1 => Some(Self::Char),
            2 => Some(Self::Token),
            3 => Some(Self::Suffix),
            4 => Some(Self::LazyChar),
            _ => None,
        }
    }

    pub fn segment(&self, s: &str) -> Vec<String> {
        let chars: Vec<char> = s.chars().collect();
        match self {
            Self::Char => on_chars(&chars),
            Self::Token => s
                .split("__")
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Suffix => match chars.first() {
                None => Vec::new(),
                Some(first) => {
                    let start = chars.len().saturating_sub(SUFFIX_LEN);
                    vec![first.to_string(), chars[start..].iter().collect()]
                }
            },
            Self::LazyChar => {
                if chars.len() < LAZY_MIN_LEN {
                    return on_chars(&chars);
                }
                let tail = chars.len() - LAZY_TAIL;
                let mut segments = vec![chars[0].to_string(), chars[1..tail].iter().collect()];
                segments.extend(on_chars(&chars[tail..]));
                segments
            }
        }
    }
}

fn on_chars(chars: &[char]) -> Vec<String> {
    chars.iter().map(char::to_string).collect()
}

impl fmt::Display for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char => "char",
            Self::Token => "token",
            Self::Suffix => "suffix",
            Self::LazyChar => "lazy-char",
        };
        write!(f, "{name}")
    }
}
