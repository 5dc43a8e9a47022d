//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DOCENT__*` 覆盖（双下划线表示嵌套，如 `DOCENT__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub knowledge: KnowledgeSection,
    pub llm: LlmSection,
    pub guardrails: GuardrailsSection,
    pub tools: ToolsSection,
    pub fallback: FallbackSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 请求未指定 show_pipeline 时的默认值
    pub show_pipeline_default: bool,
}

/// [knowledge] 段：目录文件与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub path: PathBuf,
    pub max_results: usize,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/knowledge_base.json"),
            max_results: 10,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 且拿得到 API Key 时才使用真实后端
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未配置时读取环境变量 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 1000,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [guardrails] 段：远端护栏服务或本地正则 / 屏蔽词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailsSection {
    /// 远端护栏服务地址；未设置时使用本地实现
    pub endpoint: Option<String>,
    /// 本地脱敏启用的实体（NRIC / EMAIL / PHONE），空表示全部
    pub mask_entities: Vec<String>,
    /// 本地内容过滤屏蔽词
    pub blocklist: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GuardrailsSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            mask_entities: Vec::new(),
            blocklist: Vec::new(),
            timeout_secs: 10,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [fallback] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    /// 会话以 MALFORMED_OUTPUT / UPSTREAM_ERROR 结束时改用规则兜底回答
    pub on_session_failure: bool,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            on_session_failure: true,
        }
    }
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub bind: String,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 DOCENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DOCENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOCENT")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("guardrails.blocklist")
            .with_list_parse_key("guardrails.mask_entities")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let c = AppConfig::default();
        assert_eq!(c.knowledge.max_results, 10);
        assert_eq!(c.llm.model, "gpt-4o");
        assert_eq!(c.llm.max_tokens, 1000);
        assert!(c.fallback.on_session_failure);
        assert_eq!(c.web.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\n\n[guardrails]\nblocklist = [\"bomb\"]\n\n[knowledge]\npath = \"kb.json\""
        )
        .unwrap();
        let c = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(c.llm.provider, "mock");
        assert_eq!(c.llm.model, "gpt-4o");
        assert_eq!(c.guardrails.blocklist, vec!["bomb"]);
        assert_eq!(c.knowledge.path, PathBuf::from("kb.json"));
    }
}
