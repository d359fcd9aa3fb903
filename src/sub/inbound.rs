//! 入站设置解析
//!
//! `inbounds.settings` 与 `inbounds.stream_settings` 以 JSON 文本保存，
//! 这里把订阅生成需要的字段解析为强类型结构。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use super::LinkError;

/// 可生成订阅的代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vmess" => Ok(Protocol::Vmess),
            "vless" => Ok(Protocol::Vless),
            "trojan" => Ok(Protocol::Trojan),
            "shadowsocks" => Ok(Protocol::Shadowsocks),
            other => Err(LinkError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// 入站下的客户端
#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    /// vmess / vless 的 UUID
    #[serde(default)]
    pub id: String,
    /// trojan / shadowsocks 的密码
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    /// 缺省视为未启用
    #[serde(default)]
    pub enable: bool,
    #[serde(rename = "subId", default)]
    pub sub_id: String,
    #[serde(default)]
    pub flow: String,
    /// shadowsocks 多用户模式下的单独加密方式
    #[serde(default)]
    pub method: String,
    /// vmess 加密方式
    #[serde(default)]
    pub security: String,
}

/// 入站协议设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundSettings {
    #[serde(default)]
    pub clients: Vec<Client>,
    /// shadowsocks 加密方式
    #[serde(default)]
    pub method: String,
    /// shadowsocks 2022 服务端密码
    #[serde(default)]
    pub password: String,
}

impl InboundSettings {
    pub fn parse(settings: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(settings)?)
    }

    pub fn client(&self, email: &str) -> Result<&Client, LinkError> {
        self.clients
            .iter()
            .find(|c| c.email == email)
            .ok_or_else(|| LinkError::ClientNotFound(email.to_string()))
    }

    /// 属于该订阅且已启用的客户端
    pub fn subscribed<'a>(&'a self, sub_id: &'a str) -> impl Iterator<Item = &'a Client> + 'a {
        self.clients
            .iter()
            .filter(move |c| c.enable && c.sub_id == sub_id)
    }
}

/// 传输层设置的只读视图
pub struct StreamSettings(Value);

impl StreamSettings {
    pub fn parse(stream_settings: &str) -> Result<Self, LinkError> {
        Ok(Self(serde_json::from_str(stream_settings)?))
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn network(&self) -> &str {
        self.str_at("/network").unwrap_or("tcp")
    }

    pub fn security(&self) -> &str {
        self.str_at("/security").unwrap_or("none")
    }

    /// 按 JSON Pointer 取非空字符串
    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn bool_at(&self, pointer: &str) -> bool {
        self.0.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
    }

    /// 取字符串数组的第一个元素
    pub fn first_at(&self, pointer: &str) -> Option<&str> {
        self.0
            .pointer(pointer)
            .and_then(Value::as_array)
            .and_then(|items| items.iter().find_map(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    pub fn joined_at(&self, pointer: &str) -> Option<String> {
        let items: Vec<&str> = self
            .0
            .pointer(pointer)
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_str)
            .collect();
        (!items.is_empty()).then(|| items.join(","))
    }

    /// 在 headers 对象中查找 Host（大小写不敏感，值可能是字符串或数组）
    pub fn header_host(&self, pointer: &str) -> Option<&str> {
        let headers = self.0.pointer(pointer)?.as_object()?;
        let value = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("host"))
            .map(|(_, v)| v)?;
        let host = match value {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        };
        host.filter(|s| !s.is_empty())
    }
}
