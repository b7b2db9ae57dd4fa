//! 内容处理管线

use crate::error::{ConfigError, SyncError};
use std::fmt;
use std::sync::Arc;

/// 单个处理阶段。返回 `Ok(None)` 表示内容不变。
pub trait Transform: Send + Sync {
    /// 处理器名称（用于日志和错误信息）
    fn name(&self) -> &str;

    /// `active` 为 true 表示正在远程服务或模拟合并
    fn apply(
        &self,
        content: &[u8],
        content_type: &str,
        path: &str,
        active: bool,
    ) -> anyhow::Result<Option<Vec<u8>>>;
}

/// 用闭包构造处理器
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&[u8], &str, &str, bool) -> anyhow::Result<Option<Vec<u8>>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&[u8], &str, &str, bool) -> anyhow::Result<Option<Vec<u8>>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        content: &[u8],
        content_type: &str,
        path: &str,
        active: bool,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        (self.func)(content, content_type, path, active)
    }
}

/// 按顺序执行的处理器列表
#[derive(Clone, Default)]
pub struct TransformPipeline {
    stages: Vec<Arc<dyn Transform>>,
}

impl fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

impl TransformPipeline {
    pub fn new(stages: Vec<Arc<dyn Transform>>) -> Self {
        Self { stages }
    }

    /// 通过注册表按名称创建
    pub fn from_names(names: &[String]) -> Result<Self, ConfigError> {
        let stages = names
            .iter()
            .map(|name| super::processors::create_transform(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    pub fn push(&mut self, stage: Arc<dyn Transform>) {
        self.stages.push(stage);
    }

    pub fn with_stage(mut self, stage: impl Transform + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 依次执行所有阶段；任一阶段出错立即返回，不做恢复
    pub fn apply(
        &self,
        mut content: Vec<u8>,
        content_type: &str,
        path: &str,
        active: bool,
    ) -> Result<Vec<u8>, SyncError> {
        for stage in &self.stages {
            let output = stage
                .apply(&content, content_type, path, active)
                .map_err(|source| SyncError::Transform {
                    stage: stage.name().to_string(),
                    path: path.to_string(),
                    source,
                })?;

            if let Some(processed) = output {
                content = processed;
            }
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn upper() -> FnTransform<impl Fn(&[u8], &str, &str, bool) -> anyhow::Result<Option<Vec<u8>>>> {
        FnTransform::new("upper", |content: &[u8], _: &str, _: &str, _: bool| {
            Ok(Some(content.to_ascii_uppercase()))
        })
    }

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = TransformPipeline::default()
            .with_stage(FnTransform::new("suffix", |c: &[u8], _: &str, _: &str, _: bool| {
                let mut out = c.to_vec();
                out.extend_from_slice(b"-x");
                Ok(Some(out))
            }))
            .with_stage(upper());

        let out = pipeline.apply(b"a".to_vec(), "text/plain", "a.txt", true).unwrap();
        assert_eq!(out, b"A-X");
        assert_eq!(pipeline.stage_names(), vec!["suffix", "upper"]);
    }

    #[test]
    fn test_no_change_carries_content_forward() {
        let pipeline = TransformPipeline::default()
            .with_stage(upper())
            .with_stage(FnTransform::new("noop", |_: &[u8], _: &str, _: &str, _: bool| Ok(None)));

        let out = pipeline.apply(b"var foo;".to_vec(), "text/javascript", "t.js", false).unwrap();
        assert_eq!(out, b"VAR FOO;");
    }

    #[test]
    fn test_active_flag_is_passed() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = seen.clone();
        let pipeline = TransformPipeline::default().with_stage(FnTransform::new(
            "probe",
            move |_: &[u8], _: &str, _: &str, active: bool| {
                seen_clone.store(active, Ordering::SeqCst);
                Ok(None)
            },
        ));

        pipeline.apply(Vec::new(), "text/css", "a.css", true).unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stage_failure_aborts() {
        let pipeline = TransformPipeline::default()
            .with_stage(FnTransform::new("broken", |_: &[u8], _: &str, _: &str, _: bool| {
                Err(anyhow::anyhow!("boom"))
            }))
            .with_stage(upper());

        let err = pipeline.apply(b"x".to_vec(), "text/css", "css/x.css", true).unwrap_err();
        match err {
            SyncError::Transform { stage, path, .. } => {
                assert_eq!(stage, "broken");
                assert_eq!(path, "css/x.css");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let pipeline = TransformPipeline::default();
        assert!(pipeline.is_empty());
        let out = pipeline.apply(b"raw".to_vec(), "image/png", "img/a.png", true).unwrap();
        assert_eq!(out, b"raw");
    }
}
