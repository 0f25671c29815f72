//! # Handshake Dependencies / 握手依赖
//!
//! Parameter grouping for `HandshakeOrchestrator` construction.
//! 仅用于参数打包，无默认值，无隐藏逻辑。

use std::sync::Arc;
use sg_core::ports::*;

/// All ports the handshake needs; every field is required.
#[derive(Clone)]
pub struct HandshakeDeps {
    // Room inventory / 房间与读卡器映射
    pub device_directory: Arc<dyn DeviceDirectoryPort>,

    // Badge session endpoints / 刷卡会话接口
    pub badge_sessions: Arc<dyn BadgeSessionPort>,

    // Guarded write endpoints / 受保护的业务写入接口
    pub guarded_actions: Arc<dyn GuardedActionPort>,

    // System / 系统
    pub clock: Arc<dyn ClockPort>,
}
