//! 链接备注生成

use chrono::{DateTime, Utc};

use crate::entity::{client_traffic, inbound};

/// 面板日期选择器设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePicker {
    #[default]
    Gregorian,
    Jalalian,
}

impl DatePicker {
    /// 未知取值按公历处理
    pub fn from_setting(value: &str) -> Self {
        match value {
            "jalalian" => DatePicker::Jalalian,
            _ => DatePicker::Gregorian,
        }
    }
}

/// 备注样式
#[derive(Debug, Clone)]
pub struct RemarkStyle {
    separator: String,
    order: Vec<char>,
    show_info: bool,
    datepicker: DatePicker,
    now: DateTime<Utc>,
}

impl RemarkStyle {
    /// `model` 首字符为分隔符，其后为字段顺序（i 入站备注，e 邮箱，o 附加信息）
    pub fn new(model: &str, show_info: bool, datepicker: DatePicker, now: DateTime<Utc>) -> Self {
        let mut chars = model.chars();
        let (separator, order) = match chars.next() {
            Some(sep) if model.chars().count() > 1 => (sep.to_string(), chars.collect()),
            _ => ("-".to_string(), vec!['i', 'e', 'o']),
        };

        Self {
            separator,
            order,
            show_info,
            datepicker,
            now,
        }
    }

    pub fn build(&self, inbound: &inbound::Model, client_stats: &[client_traffic::Model], email: &str) -> String {
        let mut parts: Vec<String> = self
            .order
            .iter()
            .filter_map(|c| match c {
                'i' => Some(inbound.remark.as_str()),
                'e' => Some(email),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if !self.show_info {
            return parts.join(&self.separator);
        }

        let Some(stats) = client_stats.iter().find(|s| s.email == email) else {
            return parts.join(&self.separator);
        };

        if !stats.enable {
            return format!("⛔️N/A{}{}", self.separator, parts.join(&self.separator));
        }

        let remaining = stats.total - (stats.up + stats.down);
        if remaining > 0 {
            parts.push(format!("{}📊", format_traffic(remaining)));
        }

        let expiry = stats.expiry_time / 1000;
        if expiry > 0 {
            parts.push(self.remaining_time(expiry));
            if self.datepicker == DatePicker::Gregorian {
                if let Some(date) = DateTime::from_timestamp(expiry, 0) {
                    parts.push(format!("📅{}", date.format("%Y-%m-%d")));
                }
            }
        } else if expiry < 0 {
            // 首次使用后开始计时
            parts.push(format!("{}D⏳", expiry / -86400));
        }

        parts.join(&self.separator)
    }

    fn remaining_time(&self, expiry: i64) -> String {
        let seconds = expiry - self.now.timestamp();
        if seconds <= 0 {
            return "⛔️Expired".to_string();
        }

        let days = seconds / 86400;
        let hours = (seconds % 86400) / 3600;
        let minutes = (seconds % 3600) / 60;

        match (days, hours) {
            (0, 0) if minutes == 0 => "⛔️Expired".to_string(),
            (0, 0) => format!("{}M⏳", minutes),
            (0, h) => format!("{}H⏳", h),
            (d, 0) => format!("{}D⏳", d),
            (d, h) => format!("{}D,{}H⏳", d, h),
        }
    }
}

/// 以 1024 进制格式化字节数
pub fn format_traffic(bytes: i64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn inbound(remark: &str) -> inbound::Model {
        inbound::Model {
            id: 1,
            user_id: 1,
            up: 0,
            down: 0,
            total: 0,
            remark: remark.to_string(),
            enable: true,
            expiry_time: 0,
            listen: String::new(),
            port: 443,
            protocol: "vless".to_string(),
            settings: "{}".to_string(),
            stream_settings: "{}".to_string(),
            tag: "inbound-443".to_string(),
            sniffing: "{}".to_string(),
        }
    }

    fn stats(email: &str, enable: bool, up: i64, down: i64, total: i64, expiry_time: i64) -> client_traffic::Model {
        client_traffic::Model {
            id: 1,
            inbound_id: 1,
            enable,
            email: email.to_string(),
            up,
            down,
            expiry_time,
            total,
            reset: 0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_remark_model_order() {
        let style = RemarkStyle::new("|ei", false, DatePicker::Gregorian, now());
        assert_eq!(style.build(&inbound("DE"), &[], "user1"), "user1|DE");

        let style = RemarkStyle::new("-i", false, DatePicker::Gregorian, now());
        assert_eq!(style.build(&inbound("DE"), &[], "user1"), "DE");
    }

    #[test]
    fn test_invalid_model_uses_default() {
        let style = RemarkStyle::new("", false, DatePicker::Gregorian, now());
        assert_eq!(style.build(&inbound("DE"), &[], "user1"), "DE-user1");
    }

    #[test]
    fn test_show_info_traffic_and_expiry() {
        let style = RemarkStyle::new("-ie", true, DatePicker::Gregorian, now());
        let expiry = now().timestamp_millis() + (3 * 86400 + 2 * 3600) * 1000;
        let gib = 1024 * 1024 * 1024;
        let rows = [stats("user1", true, gib / 2, gib / 2, 3 * gib, expiry)];

        assert_eq!(
            style.build(&inbound("DE"), &rows, "user1"),
            "DE-user1-2.00GB📊-3D,2H⏳-📅2024-01-04"
        );
    }

    #[test]
    fn test_jalalian_omits_calendar_date() {
        let style = RemarkStyle::new("-ie", true, DatePicker::Jalalian, now());
        let expiry = now().timestamp_millis() + 5 * 3600 * 1000;
        let rows = [stats("user1", true, 0, 0, 0, expiry)];

        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "DE-user1-5H⏳");
    }

    #[test]
    fn test_disabled_and_expired_clients() {
        let style = RemarkStyle::new("-ie", true, DatePicker::Jalalian, now());

        let rows = [stats("user1", false, 0, 0, 0, 0)];
        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "⛔️N/A-DE-user1");

        let rows = [stats("user1", true, 0, 0, 0, now().timestamp_millis() - 1000)];
        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "DE-user1-⛔️Expired");

        // 不足一分钟
        let rows = [stats("user1", true, 0, 0, 0, now().timestamp_millis() + 30_000)];
        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "DE-user1-⛔️Expired");

        let rows = [stats("user1", true, 0, 0, 0, now().timestamp_millis() + 90_000)];
        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "DE-user1-1M⏳");

        let rows = [stats("user1", true, 0, 0, 0, -7 * 86_400_000)];
        assert_eq!(style.build(&inbound("DE"), &rows, "user1"), "DE-user1-7D⏳");
    }

    #[test]
    fn test_format_traffic() {
        assert_eq!(format_traffic(512), "512.00B");
        assert_eq!(format_traffic(1536), "1.50KB");
        assert_eq!(format_traffic(5 * 1024 * 1024 * 1024), "5.00GB");
    }
}
