//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! `TileServiceState` 是长生命周期的入口对象，由调用方（CLI 或宿主程序）统一持有。
//! 每次拼图可以携带一个请求 ID，其他任务凭 ID 随时取消。
//!
//! ## 实现思路
//!
//! - 请求开始时登记 `CancelSignal`，结束（无论成败）后移除。
//! - 档位以字符串进出，便于命令行与配置文件直接透传。

use std::collections::HashMap;
use std::sync::Mutex;

use super::cancel::CancelSignal;
use super::handler::{TileAdvancedConfig, TileHandler, TileProgress, TiledGrid};
use super::source::Reference;
use super::transport::{Fetch, HttpFetcher, LocalFiles, OpenFile};
use super::{GridSpec, TileError, TilePerformanceProfile, TilerConfig};

/// 拼图服务状态。
pub struct TileServiceState<F = HttpFetcher, O = LocalFiles> {
    handler: TileHandler<F, O>,
    cancel_flags: Mutex<HashMap<String, CancelSignal>>,
}

impl TileServiceState {
    /// 使用默认配置创建服务状态。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_tiler::tiler::TileServiceState;
    ///
    /// let service = TileServiceState::new()?;
    /// # Ok::<(), image_tiler::tiler::TileError>(())
    /// ```
    pub fn new() -> Result<Self, TileError> {
        Self::with_config(TilerConfig::default())
    }

    pub fn with_config(config: TilerConfig) -> Result<Self, TileError> {
        Ok(Self::with_handler(TileHandler::new(config)?))
    }
}

impl<F: Fetch, O: OpenFile> TileServiceState<F, O> {
    pub fn with_handler(handler: TileHandler<F, O>) -> Self {
        Self {
            handler,
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// 执行一次可取消的拼图。
    ///
    /// 同一 `request_id` 重复登记时，后者覆盖前者的取消信号。
    pub async fn tile_with_request_id<P>(
        &self,
        request_id: &str,
        refs: &[Reference],
        spec: &GridSpec,
        on_progress: P,
    ) -> Result<TiledGrid, TileError>
    where
        P: Fn(TileProgress) + Send + Sync,
    {
        let signal = CancelSignal::new();
        {
            let mut guard = self
                .cancel_flags
                .lock()
                .map_err(|_| TileError::ResourceLimit("取消标志锁已中毒".to_string()))?;
            guard.insert(request_id.to_string(), signal.clone());
        }

        let result = self
            .handler
            .tile_images_with_hooks(refs, spec, on_progress, Some(&signal))
            .await;

        {
            let mut guard = self
                .cancel_flags
                .lock()
                .map_err(|_| TileError::ResourceLimit("取消标志锁已中毒".to_string()))?;
            guard.remove(request_id);
        }

        if let Err(err) = &result {
            log::warn!("❌ 拼图请求 {} 失败 [{}]：{}", request_id, err.code(), err);
        }

        result
    }

    /// 取消进行中的请求；请求不存在时返回 `false`。
    pub fn cancel(&self, request_id: &str) -> Result<bool, TileError> {
        let guard = self
            .cancel_flags
            .lock()
            .map_err(|_| TileError::ResourceLimit("取消标志锁已中毒".to_string()))?;

        match guard.get(request_id) {
            Some(signal) => {
                signal.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 设置性能档位。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use image_tiler::tiler::TileServiceState;
    ///
    /// let service = TileServiceState::new()?;
    /// service.set_performance_profile("speed")?;
    /// # Ok::<(), image_tiler::tiler::TileError>(())
    /// ```
    pub fn set_performance_profile(&self, profile: &str) -> Result<(), TileError> {
        let profile = TilePerformanceProfile::parse(profile)?;
        self.handler.set_performance_profile(profile)
    }

    pub fn get_performance_profile(&self) -> Result<String, TileError> {
        let profile = self.handler.get_performance_profile()?;
        Ok(profile.as_str().to_string())
    }

    pub fn set_advanced_config(&self, config: TileAdvancedConfig) -> Result<(), TileError> {
        self.handler.set_advanced_config(config)
    }

    pub fn get_advanced_config(&self) -> Result<TileAdvancedConfig, TileError> {
        self.handler.get_advanced_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::resolver::tests::StubTransport;
    use crate::tiler::transport::FetchError;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn stub_service() -> TileServiceState<StubTransport, StubTransport> {
        let stub = StubTransport::default();
        TileServiceState::with_handler(TileHandler::with_transport(
            TilerConfig::default(),
            stub.clone(),
            stub,
        ))
    }

    /// 永不返回的获取实现。
    struct HangingFetcher;

    impl Fetch for HangingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            std::future::pending().await
        }
    }

    #[test]
    fn service_set_and_get_profile_roundtrip() {
        let service = stub_service();

        for profile in ["quality", "balanced", "speed"] {
            service.set_performance_profile(profile).expect("set profile should succeed");
            assert_eq!(service.get_performance_profile().expect("get profile"), profile);
        }
    }

    #[test]
    fn service_rejects_invalid_profile() {
        let service = stub_service();

        let result = service.set_performance_profile("ultra");
        assert!(matches!(result, Err(TileError::InvalidSpec(_))));
    }

    #[test]
    fn service_profile_concurrent_access() {
        let service = Arc::new(stub_service());

        let mut handles = Vec::new();
        for worker_id in 0..6 {
            let service = Arc::clone(&service);
            handles.push(thread::spawn(move || {
                let profiles = ["quality", "balanced", "speed", "fastest"];
                for i in 0..100 {
                    let profile = profiles[(worker_id + i) % profiles.len()];
                    let result = service.set_performance_profile(profile);
                    assert_eq!(result.is_ok(), profile != "fastest");

                    let current = service.get_performance_profile().expect("get profile");
                    assert!(matches!(current.as_str(), "quality" | "balanced" | "speed"));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }
    }

    #[test]
    fn cancel_unknown_request_returns_false() {
        let service = stub_service();
        assert!(!service.cancel("nope").expect("cancel should not fail"));
    }

    #[tokio::test]
    async fn cancel_by_request_id_stops_running_tile() {
        let service = Arc::new(TileServiceState::with_handler(TileHandler::with_transport(
            TilerConfig::default(),
            HangingFetcher,
            StubTransport::default(),
        )));
        let spec = GridSpec::new(8, 2, 0).expect("valid spec");

        let runner = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let refs = vec![Reference::parse("https://example.com/forever.png")];
                service.tile_with_request_id("req-1", &refs, &spec, |_| {}).await
            })
        };

        let mut cancelled = false;
        for _ in 0..100 {
            if service.cancel("req-1").expect("cancel should not fail") {
                cancelled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(cancelled, "request should have been registered");

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("cancelled request should finish promptly")
            .expect("runner should not panic");
        assert!(matches!(result, Err(TileError::Cancelled(_))));
        assert!(!service.cancel("req-1").expect("cancel should not fail"));
    }

    #[tokio::test]
    async fn finished_request_is_unregistered() {
        let service = stub_service();
        let spec = GridSpec::new(4, 2, 1).expect("valid spec");

        let grid = service
            .tile_with_request_id("req-2", &[Reference::Blank], &spec, |_| {})
            .await
            .expect("blank tiling should succeed");

        assert_eq!((grid.canvas.width(), grid.canvas.height()), (9, 4));
        assert!(!service.cancel("req-2").expect("cancel should not fail"));
    }
}
