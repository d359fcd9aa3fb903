//! 订阅流量汇总
//!
//! 把同一订阅下多个客户端的流量记录合并为一条汇总，
//! 用于生成 `Subscription-Userinfo` 响应头。

use std::fmt;

use crate::entity::client_traffic;

/// 流量配额累加状态（0 表示不限量）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Quota {
    #[default]
    Empty,
    Unlimited,
    Limited(i64),
}

impl Quota {
    fn from_total(total: i64) -> Self {
        if total == 0 {
            Quota::Unlimited
        } else {
            Quota::Limited(total)
        }
    }

    fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Quota::Empty, q) | (q, Quota::Empty) => q,
            (Quota::Unlimited, _) | (_, Quota::Unlimited) => Quota::Unlimited,
            (Quota::Limited(a), Quota::Limited(b)) => Quota::Limited(a + b),
        }
    }

    fn bytes(self) -> i64 {
        match self {
            Quota::Limited(total) => total,
            Quota::Empty | Quota::Unlimited => 0,
        }
    }
}

/// 到期时间累加状态：所有记录一致时保留，否则视为未知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Expiry {
    #[default]
    Empty,
    Agreed(i64),
    Mixed,
}

impl Expiry {
    fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Expiry::Empty, e) | (e, Expiry::Empty) => e,
            (Expiry::Agreed(a), Expiry::Agreed(b)) if a == b => Expiry::Agreed(a),
            _ => Expiry::Mixed,
        }
    }

    fn millis(self) -> i64 {
        match self {
            Expiry::Agreed(ms) => ms,
            Expiry::Empty | Expiry::Mixed => 0,
        }
    }
}

/// 订阅流量汇总
///
/// `default()` 为单位元，`combine` 满足结合律与交换律，
/// 因此折叠顺序不影响结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficSummary {
    up: i64,
    down: i64,
    quota: Quota,
    expiry: Expiry,
}

impl TrafficSummary {
    /// 由单个客户端的计数构造（expiry_time 单位为毫秒）
    pub fn from_usage(up: i64, down: i64, total: i64, expiry_time: i64) -> Self {
        Self {
            up,
            down,
            quota: Quota::from_total(total),
            expiry: Expiry::Agreed(expiry_time),
        }
    }

    pub fn combine(self, other: Self) -> Self {
        Self {
            up: self.up + other.up,
            down: self.down + other.down,
            quota: self.quota.combine(other.quota),
            expiry: self.expiry.combine(other.expiry),
        }
    }

    pub fn fold<I>(items: I) -> Self
    where
        I: IntoIterator<Item = TrafficSummary>,
    {
        items
            .into_iter()
            .fold(TrafficSummary::default(), TrafficSummary::combine)
    }

    pub fn up(&self) -> i64 {
        self.up
    }

    pub fn down(&self) -> i64 {
        self.down
    }

    /// 总配额字节数，0 表示不限量
    pub fn total(&self) -> i64 {
        self.quota.bytes()
    }

    /// 到期时间（毫秒），0 表示无到期或不一致
    pub fn expiry_time(&self) -> i64 {
        self.expiry.millis()
    }

    /// `Subscription-Userinfo` 头的值
    pub fn header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TrafficSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upload={}; download={}; total={}; expire={}",
            self.up(),
            self.down(),
            self.total(),
            self.expiry_time() / 1000
        )
    }
}

impl From<&client_traffic::Model> for TrafficSummary {
    fn from(traffic: &client_traffic::Model) -> Self {
        Self::from_usage(traffic.up, traffic.down, traffic.total, traffic.expiry_time)
    }
}
