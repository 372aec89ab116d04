//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `TileHandler` 只负责流程编排与配置管理。
//! 处理链路固定为：
//! 1. 校验版式（失败立即返回，不做任何 I/O）
//! 2. 读取配置快照
//! 3. 并发加载每个来源（同一来源只加载一次）
//! 4. 阻塞线程池中解码 + 规整为缩略图，失败降级为空白格
//! 5. 按输入顺序拼接画布
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<TilerConfig>>` 支持运行时切档，单次调用内使用同一快照。
//! - `futures::stream::buffered` 限制并发，同时按输入顺序产出结果。
//! - 传入 `CancelSignal` 时，取消会立即丢弃进行中的任务并返回 `Cancelled`。
//! - 记录 `load/compose/total` 阶段耗时，便于性能诊断。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::StreamExt;

use super::cancel::CancelSignal;
use super::compose::compose;
use super::normalize::{blank_tile, normalize};
use super::pipeline::decode_raw_image;
use super::resolver::{SourceResolver, Unavailable};
use super::source::{Canvas, Reference, Thumbnail};
use super::transport::{Fetch, HttpFetcher, LocalFiles, OpenFile, redact_url_for_log};
use super::{GridSpec, TileError, TilePerformanceProfile, TilerConfig};

/// 单个格子的处理结果。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    Rendered,
    Blank,
    Failed {
        code: &'static str,
        stage: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CellOutcome {
    pub index: usize,
    pub reference: String,
    #[serde(flatten)]
    pub status: CellStatus,
}

/// 一次拼图的逐格报告。
#[derive(Debug, Clone, serde::Serialize)]
pub struct TileReport {
    pub cells: Vec<CellOutcome>,
    pub rendered: usize,
    pub blank: usize,
    pub failed: usize,
    pub padding: usize,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: u128,
}

/// 进度回调载荷。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileProgress {
    pub completed: usize,
    pub total: usize,
}

/// 画布与报告。
#[derive(Debug, Clone)]
pub struct TiledGrid {
    pub canvas: Canvas,
    pub report: TileReport,
}

/// 运行时可调整的高级配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileAdvancedConfig {
    pub max_concurrency: usize,
    pub max_decoded_pixels: u64,
}

/// 拼图处理器。
///
/// 封装配置状态与来源解析器，并编排各子模块实现完整流程。
pub struct TileHandler<F = HttpFetcher, O = LocalFiles> {
    pub(super) config: Arc<RwLock<TilerConfig>>,
    resolver: SourceResolver<F, O>,
}

impl TileHandler {
    /// 使用默认网络与文件能力创建处理器。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_tiler::tiler::{GridSpec, Reference, TileHandler, TilerConfig};
    ///
    /// # async fn demo() -> Result<(), image_tiler::tiler::TileError> {
    /// let handler = TileHandler::new(TilerConfig::default())?;
    /// let refs = vec![Reference::parse("./pic/fish.png"), Reference::parse("https://example.com/a.jpg")];
    /// let canvas = handler.tile_images(&refs, &GridSpec::new(136, 6, 4)?).await?;
    /// assert_eq!(canvas.height(), 136);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: TilerConfig) -> Result<Self, TileError> {
        let fetcher = HttpFetcher::new(config.clone())
            .map_err(|e| TileError::Network(e.to_string()))?;
        let opener = LocalFiles::new(&config);
        Ok(Self::with_transport(config, fetcher, opener))
    }
}

impl<F: Fetch, O: OpenFile> TileHandler<F, O> {
    /// 注入自定义获取与读取能力。
    pub fn with_transport(config: TilerConfig, fetcher: F, opener: O) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            resolver: SourceResolver::new(fetcher, opener),
        }
    }

    /// 获取配置快照，保证单次调用链路使用一致参数。
    pub(super) fn config_snapshot(&self) -> Result<TilerConfig, TileError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| TileError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    pub fn set_performance_profile(&self, profile: TilePerformanceProfile) -> Result<(), TileError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| TileError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换性能档位：{:?}（filter={:?}, concurrency={}）",
            profile,
            config.resize_filter,
            config.max_concurrency
        );

        Ok(())
    }

    pub fn get_performance_profile(&self) -> Result<TilePerformanceProfile, TileError> {
        let config = self
            .config
            .read()
            .map_err(|_| TileError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 设置并发与解码上限。
    pub fn set_advanced_config(&self, advanced: TileAdvancedConfig) -> Result<(), TileError> {
        if !(1..=64).contains(&advanced.max_concurrency) {
            return Err(TileError::InvalidSpec("max_concurrency 必须在 1~64 之间".to_string()));
        }
        if !(1_000_000..=400_000_000).contains(&advanced.max_decoded_pixels) {
            return Err(TileError::InvalidSpec(
                "max_decoded_pixels 必须在 1,000,000~400,000,000 之间".to_string(),
            ));
        }

        let mut config = self
            .config
            .write()
            .map_err(|_| TileError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.max_concurrency = advanced.max_concurrency;
        config.max_decoded_pixels = advanced.max_decoded_pixels;

        Ok(())
    }

    pub fn get_advanced_config(&self) -> Result<TileAdvancedConfig, TileError> {
        let config = self.config_snapshot()?;
        Ok(TileAdvancedConfig {
            max_concurrency: config.max_concurrency,
            max_decoded_pixels: config.max_decoded_pixels,
        })
    }

    /// 处理主入口：来源列表 → 画布。
    pub async fn tile_images(&self, refs: &[Reference], spec: &GridSpec) -> Result<Canvas, TileError> {
        let grid = self.tile_images_with_hooks(refs, spec, |_| {}, None).await?;
        Ok(grid.canvas)
    }

    pub async fn tile_images_with_hooks<P>(
        &self,
        refs: &[Reference],
        spec: &GridSpec,
        on_progress: P,
        cancel: Option<&CancelSignal>,
    ) -> Result<TiledGrid, TileError>
    where
        P: Fn(TileProgress) + Send + Sync,
    {
        spec.validate()?;
        spec.canvas_height(refs.len())?;
        let config = self.config_snapshot()?;

        let work = self.run(refs, spec, config, &on_progress);

        match cancel {
            None => work.await,
            Some(signal) => {
                if signal.is_cancelled() {
                    return Err(TileError::Cancelled("拼图已取消".to_string()));
                }

                tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        log::warn!("🛑 拼图已取消，放弃进行中的任务");
                        Err(TileError::Cancelled("拼图已取消".to_string()))
                    }
                    result = work => result,
                }
            }
        }
    }

    async fn run<P>(
        &self,
        refs: &[Reference],
        spec: &GridSpec,
        config: TilerConfig,
        on_progress: &P,
    ) -> Result<TiledGrid, TileError>
    where
        P: Fn(TileProgress) + Send + Sync,
    {
        let total_start = Instant::now();

        // 相同来源只处理一次
        let mut unique: Vec<&Reference> = Vec::new();
        let mut slot_of: HashMap<&Reference, usize> = HashMap::new();
        let slots: Vec<usize> = refs
            .iter()
            .map(|reference| {
                *slot_of.entry(reference).or_insert_with(|| {
                    unique.push(reference);
                    unique.len() - 1
                })
            })
            .collect();

        let total = unique.len();
        let concurrency = config.max_concurrency.max(1);

        log::info!(
            "🚀 开始拼图 - {} 个来源（去重后 {}），并发 {}，版式 {}px/{}列/间隔{}px",
            refs.len(),
            total,
            concurrency,
            spec.tile_size,
            spec.row_length,
            spec.spacing
        );

        let load_start = Instant::now();
        let mut results: Vec<(Thumbnail, CellStatus)> = Vec::with_capacity(total);
        // 先收集成具体的 future，stream 中不保留闭包，整体 future 才能 `Send`
        let pending: Vec<_> = unique
            .iter()
            .map(|reference| self.process_one(reference, spec.tile_size, &config))
            .collect();
        let mut stream = futures::stream::iter(pending).buffered(concurrency);

        while let Some(result) = stream.next().await {
            results.push(result);
            on_progress(TileProgress {
                completed: results.len(),
                total,
            });
        }
        drop(stream);
        let load_elapsed = load_start.elapsed();

        let thumbnails: Vec<Thumbnail> = slots.iter().map(|&slot| results[slot].0.clone()).collect();

        let compose_start = Instant::now();
        let canvas = compose(&thumbnails, spec)?;
        let compose_elapsed = compose_start.elapsed();

        let cells: Vec<CellOutcome> = refs
            .iter()
            .zip(&slots)
            .enumerate()
            .map(|(index, (reference, &slot))| CellOutcome {
                index,
                reference: display_reference(reference),
                status: results[slot].1.clone(),
            })
            .collect();

        let count = |pred: fn(&CellStatus) -> bool| cells.iter().filter(|c| pred(&c.status)).count();
        let report = TileReport {
            rendered: count(|s| matches!(s, CellStatus::Rendered)),
            blank: count(|s| matches!(s, CellStatus::Blank)),
            failed: count(|s| matches!(s, CellStatus::Failed { .. })),
            padding: super::compose::padding_for(refs.len(), spec.row_length),
            width: canvas.width(),
            height: canvas.height(),
            elapsed_ms: total_start.elapsed().as_millis(),
            cells,
        };

        log::info!(
            "✅ 拼图完成 - {}x{} 成功 {} 空白 {} 失败 {} - load={}ms compose={}ms total={}ms",
            report.width,
            report.height,
            report.rendered,
            report.blank,
            report.failed,
            load_elapsed.as_millis(),
            compose_elapsed.as_millis(),
            report.elapsed_ms
        );

        Ok(TiledGrid { canvas, report })
    }

    /// 单个来源：加载 → 解码 → 规整；任何失败都降级为空白格。
    async fn process_one(
        &self,
        reference: &Reference,
        tile_size: u32,
        config: &TilerConfig,
    ) -> (Thumbnail, CellStatus) {
        let raw = match self.resolver.load(reference, config).await {
            Ok(raw) => raw,
            Err(Unavailable::Blank) => return (blank_tile(tile_size), CellStatus::Blank),
            Err(Unavailable::Failed(err)) => return degrade(reference, tile_size, err),
        };

        let owned_reference = reference.clone();
        let config = config.clone();
        let joined = tokio::task::spawn_blocking(move || {
            decode_raw_image(raw, owned_reference, &config)
                .map(|image| normalize(&image, tile_size, config.resize_filter))
        })
        .await;

        match joined {
            Ok(Ok(thumbnail)) => (thumbnail, CellStatus::Rendered),
            Ok(Err(err)) => degrade(reference, tile_size, err),
            Err(join_err) => degrade(
                reference,
                tile_size,
                TileError::Decode(format!("线程执行失败：{}", join_err)),
            ),
        }
    }
}

fn degrade(reference: &Reference, tile_size: u32, err: TileError) -> (Thumbnail, CellStatus) {
    log::warn!(
        "⚠️ 来源不可用，使用空白格 - {}：{}",
        display_reference(reference),
        err
    );

    let status = CellStatus::Failed {
        code: err.code(),
        stage: err.stage(),
        message: err.to_string(),
    };
    (blank_tile(tile_size), status)
}

fn display_reference(reference: &Reference) -> String {
    match reference {
        Reference::RemoteUrl(url) => redact_url_for_log(url),
        other => other.to_string(),
    }
}
