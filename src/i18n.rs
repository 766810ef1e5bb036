//! Status-bar messages keyed by `(Locale, MessageId)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;
use crate::model::LookupStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    English,
    Persian,
    Chinese,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::English, Locale::Persian, Locale::Chinese];

    pub fn code(&self) -> &'static str {
        match self {
            Locale::English => "en",
            Locale::Persian => "fa",
            Locale::Chinese => "zh",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Locale::English => "English",
            Locale::Persian => "فارسی",
            Locale::Chinese => "中文",
        };
        f.write_str(name)
    }
}

impl FromStr for Locale {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "en" | "English" | "english" => Ok(Locale::English),
            "fa" | "فارسی" | "Persian" | "persian" => Ok(Locale::Persian),
            "zh" | "中文" | "Chinese" | "chinese" => Ok(Locale::Chinese),
            other => Err(TrackerError::Config(format!("Unknown language: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Ready,
    LookingUp,
    LookupInProgress,
    InvalidIp,
    LookupSuccess,
    LookupFailed,
    NetworkError,
    HistoryCleared,
    HistorySaveFailed,
    ExportSuccess,
    ExportFailed,
}

impl MessageId {
    pub const ALL: [MessageId; 11] = [
        MessageId::Ready,
        MessageId::LookingUp,
        MessageId::LookupInProgress,
        MessageId::InvalidIp,
        MessageId::LookupSuccess,
        MessageId::LookupFailed,
        MessageId::NetworkError,
        MessageId::HistoryCleared,
        MessageId::HistorySaveFailed,
        MessageId::ExportSuccess,
        MessageId::ExportFailed,
    ];

    /// Messages that carry one `{}` argument.
    pub fn takes_argument(&self) -> bool {
        matches!(
            self,
            MessageId::HistorySaveFailed | MessageId::ExportSuccess | MessageId::ExportFailed
        )
    }
}

impl From<LookupStatus> for MessageId {
    fn from(status: LookupStatus) -> Self {
        match status {
            LookupStatus::Success => MessageId::LookupSuccess,
            LookupStatus::InvalidInput => MessageId::InvalidIp,
            LookupStatus::LookupFailed => MessageId::LookupFailed,
            LookupStatus::NetworkError => MessageId::NetworkError,
        }
    }
}

pub fn text(locale: Locale, id: MessageId) -> &'static str {
    use Locale::*;
    use MessageId::*;

    match (locale, id) {
        (English, Ready) => "Ready",
        (English, LookingUp) => "Looking up IP...",
        (English, LookupInProgress) => "A lookup is already in progress",
        (English, InvalidIp) => "Invalid IP address format",
        (English, LookupSuccess) => "Lookup successful",
        (English, LookupFailed) => "Lookup failed",
        (English, NetworkError) => "Network error",
        (English, HistoryCleared) => "History cleared",
        (English, HistorySaveFailed) => "Could not save to history: {}",
        (English, ExportSuccess) => "History exported to {}",
        (English, ExportFailed) => "Export failed: {}",

        (Persian, Ready) => "آماده",
        (Persian, LookingUp) => "در حال جستجوی آی‌پی...",
        (Persian, LookupInProgress) => "یک جستجو در حال انجام است",
        (Persian, InvalidIp) => "فرمت آدرس آی‌پی نامعتبر است",
        (Persian, LookupSuccess) => "جستجو با موفقیت انجام شد",
        (Persian, LookupFailed) => "جستجو ناموفق بود",
        (Persian, NetworkError) => "خطای شبکه",
        (Persian, HistoryCleared) => "تاریخچه پاک شد",
        (Persian, HistorySaveFailed) => "ذخیره در تاریخچه ناموفق بود: {}",
        (Persian, ExportSuccess) => "تاریخچه به {} صادر شد",
        (Persian, ExportFailed) => "خطا در صادرات: {}",

        (Chinese, Ready) => "就绪",
        (Chinese, LookingUp) => "正在查询IP...",
        (Chinese, LookupInProgress) => "查询正在进行中",
        (Chinese, InvalidIp) => "IP地址格式无效",
        (Chinese, LookupSuccess) => "查询成功",
        (Chinese, LookupFailed) => "查询失败",
        (Chinese, NetworkError) => "网络错误",
        (Chinese, HistoryCleared) => "历史记录已清除",
        (Chinese, HistorySaveFailed) => "无法保存到历史记录：{}",
        (Chinese, ExportSuccess) => "历史记录导出到 {}",
        (Chinese, ExportFailed) => "导出失败：{}",
    }
}

/// Message text with its `{}` placeholder filled in.
pub fn format(locale: Locale, id: MessageId, arg: impl fmt::Display) -> String {
    text(locale, id).replacen("{}", &arg.to_string(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_message_translated() {
        for locale in Locale::ALL {
            for id in MessageId::ALL {
                let message = text(locale, id);
                assert!(!message.is_empty());
                assert_eq!(message.contains("{}"), id.takes_argument(), "{:?}/{:?}", locale, id);
            }
        }
    }

    #[test]
    fn test_format_fills_placeholder() {
        assert_eq!(
            format(Locale::English, MessageId::ExportSuccess, "/tmp/h.csv"),
            "History exported to /tmp/h.csv"
        );
        assert_eq!(format(Locale::Chinese, MessageId::ExportFailed, "denied"), "导出失败：denied");
    }

    #[test]
    fn test_locale_parsing() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::English);
        assert_eq!("فارسی".parse::<Locale>().unwrap(), Locale::Persian);
        assert_eq!("zh".parse::<Locale>().unwrap(), Locale::Chinese);
        assert!("klingon".parse::<Locale>().is_err());
        for locale in Locale::ALL {
            assert_eq!(locale.code().parse::<Locale>().unwrap(), locale);
            assert_eq!(locale.to_string().parse::<Locale>().unwrap(), locale);
        }
    }

    #[test]
    fn test_status_maps_to_message() {
        assert_eq!(MessageId::from(LookupStatus::LookupFailed), MessageId::LookupFailed);
        assert_eq!(text(Locale::English, LookupStatus::InvalidInput.into()), "Invalid IP address format");
    }
}
