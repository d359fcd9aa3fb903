//! 订阅服务配置模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "subserver.toml";

/// 订阅服务配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 订阅服务端口
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// 监听地址
    #[serde(default = "default_listen")]
    pub listen: String,

    /// 数据库路径（与面板共用）
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// 链接订阅路径前缀
    #[serde(default = "default_sub_path")]
    pub sub_path: String,

    /// JSON 订阅路径前缀
    #[serde(default = "default_sub_json_path")]
    pub sub_json_path: String,

    /// 是否对链接订阅做 base64 编码
    #[serde(default = "default_true")]
    pub sub_encrypt: bool,

    /// 备注中是否附带剩余流量和到期信息
    #[serde(default = "default_true")]
    pub sub_show_info: bool,

    /// 备注模型：首字符为分隔符，其余为 i(入站备注) e(邮箱) o(附加) 的顺序
    #[serde(default = "default_remark_model")]
    pub sub_remark_model: String,

    /// 客户端更新间隔（小时），原样写入 Profile-Update-Interval
    #[serde(default = "default_update_interval")]
    pub sub_update_interval: String,

    /// 替换链接主机时使用的备用域名
    #[serde(default = "default_alternate_host")]
    pub alternate_host: String,

    /// JSON 订阅附加项（JSON 文本，留空表示不启用）
    #[serde(default)]
    pub sub_json_fragment: String,

    #[serde(default)]
    pub sub_json_noise: String,

    #[serde(default)]
    pub sub_json_mux: String,

    #[serde(default)]
    pub sub_json_rules: String,
}

fn default_web_port() -> u16 {
    2096
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_db_path() -> String {
    "./data/x-ui.db".to_string()
}

fn default_sub_path() -> String {
    "/sub/".to_string()
}

fn default_sub_json_path() -> String {
    "/json/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_remark_model() -> String {
    "-ieo".to_string()
}

fn default_update_interval() -> String {
    "12".to_string()
}

fn default_alternate_host() -> String {
    "germ.realityvpn.ru".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_port: default_web_port(),
            listen: default_listen(),
            db_path: default_db_path(),
            sub_path: default_sub_path(),
            sub_json_path: default_sub_json_path(),
            sub_encrypt: true,
            sub_show_info: true,
            sub_remark_model: default_remark_model(),
            sub_update_interval: default_update_interval(),
            alternate_host: default_alternate_host(),
            sub_json_fragment: String::new(),
            sub_json_noise: String::new(),
            sub_json_mux: String::new(),
            sub_json_rules: String::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)
            .with_context(|| format!("无法读取配置文件: {}", path_ref.display()))?;

        let config: Config = toml::from_str(&content).with_context(|| "解析配置文件失败")?;

        Ok(config)
    }

    /// 加载配置：优先命令行指定的文件，其次按约定位置查找，最后使用默认配置
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            tracing::info!("📋 加载配置文件: {}", path.display());
            return Ok(config);
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let found = exe_dir
            .map(|dir| dir.join(CONFIG_FILE))
            .into_iter()
            .chain(std::iter::once(PathBuf::from(CONFIG_FILE)))
            .chain(std::iter::once(PathBuf::from("..").join(CONFIG_FILE)))
            .find(|p| p.exists());

        match found {
            Some(path) => {
                let config = Self::from_file(&path)?;
                tracing::info!("📋 加载配置文件: {}", path.display());
                Ok(config)
            }
            None => {
                tracing::warn!("未找到配置文件 {}，使用默认配置", CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    pub fn get_bind_addr(&self) -> String {
        format!("{}:{}", self.listen, self.web_port)
    }

    /// 生成交给订阅服务的只读设置
    pub fn sub_settings(&self) -> SubSettings {
        SubSettings {
            show_info: self.sub_show_info,
            remark_model: self.sub_remark_model.clone(),
            update_interval: self.sub_update_interval.clone(),
            encrypt: self.sub_encrypt,
            alternate_host: self.alternate_host.clone(),
            json_fragment: self.sub_json_fragment.clone(),
            json_noise: self.sub_json_noise.clone(),
            json_mux: self.sub_json_mux.clone(),
            json_rules: self.sub_json_rules.clone(),
        }
    }
}

/// 订阅生成的只读设置，构造服务时传入
#[derive(Debug, Clone)]
pub struct SubSettings {
    pub show_info: bool,
    pub remark_model: String,
    pub update_interval: String,
    pub encrypt: bool,
    pub alternate_host: String,
    pub json_fragment: String,
    pub json_noise: String,
    pub json_mux: String,
    pub json_rules: String,
}

impl Default for SubSettings {
    fn default() -> Self {
        Config::default().sub_settings()
    }
}
