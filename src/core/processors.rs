//! 内置处理器与注册表
//!
//! CSS 使用 lightningcss，JS 使用 oxc。两者只在管线生效时处理对应类型。
//! lightningcss 无法解析的旧式 CSS hack 原样上传；JS 解析失败视为处理失败。

use super::pipeline::Transform;
use crate::config::{CSS_MIMETYPES, JS_MIMETYPES};
use crate::error::ConfigError;
use anyhow::{anyhow, Context};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use std::sync::Arc;
use tracing::warn;

pub const CSS_MINIFIER: &str = "css_minifier";
pub const JS_MINIFIER: &str = "js_minifier";

/// 已注册的处理器名称
pub const BUILTIN: &[&str] = &[CSS_MINIFIER, JS_MINIFIER];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN.contains(&name)
}

/// 按名称创建处理器
pub fn create_transform(name: &str) -> Result<Arc<dyn Transform>, ConfigError> {
    match name {
        CSS_MINIFIER => Ok(Arc::new(CssMinifier)),
        JS_MINIFIER => Ok(Arc::new(JsMinifier)),
        other => Err(ConfigError::UnknownProcessor(other.to_string())),
    }
}

fn type_in(content_type: &str, types: &[&str]) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    types.iter().any(|t| t.eq_ignore_ascii_case(essence))
}

/// CSS 压缩
#[derive(Debug, Clone, Copy, Default)]
pub struct CssMinifier;

impl Transform for CssMinifier {
    fn name(&self) -> &str {
        CSS_MINIFIER
    }

    fn apply(
        &self,
        content: &[u8],
        content_type: &str,
        path: &str,
        active: bool,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        if !active || !type_in(content_type, CSS_MIMETYPES) {
            return Ok(None);
        }

        let source = std::str::from_utf8(content).context("CSS 不是有效的 UTF-8")?;
        let stylesheet = match StyleSheet::parse(source, ParserOptions::default()) {
            Ok(stylesheet) => stylesheet,
            Err(e) => {
                warn!("无法解析 CSS，原样上传: {} - {}", path, e);
                return Ok(None);
            }
        };

        match stylesheet.to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        }) {
            Ok(result) => Ok(Some(result.code.into_bytes())),
            Err(e) => {
                warn!("无法输出压缩后的 CSS，原样上传: {} - {}", path, e);
                Ok(None)
            }
        }
    }
}

/// JS 压缩（只去除空白和注释，不改名，保留全局变量）
#[derive(Debug, Clone, Copy, Default)]
pub struct JsMinifier;

impl Transform for JsMinifier {
    fn name(&self) -> &str {
        JS_MINIFIER
    }

    fn apply(
        &self,
        content: &[u8],
        content_type: &str,
        _path: &str,
        active: bool,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        if !active || !type_in(content_type, JS_MIMETYPES) {
            return Ok(None);
        }

        let source = std::str::from_utf8(content).context("JS 不是有效的 UTF-8")?;
        let allocator = Allocator::default();
        // 浏览器脚本按 script 解析
        let source_type = SourceType::mjs().with_module(false);
        let ret = Parser::new(&allocator, source, source_type).parse();
        if let Some(first) = ret.errors.first() {
            return Err(anyhow!(
                "解析 JS 失败 ({} 个错误): {}",
                ret.errors.len(),
                first
            ));
        }

        let program = ret.program;
        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                ..CodegenOptions::default()
            })
            .build(&program)
            .code;

        Ok(Some(code.into_bytes()))
    }
}
