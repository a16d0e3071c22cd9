//! 事件接收端 (Event sink)
//!
//! 至多一次, 尽力投递: 失败只记录日志并丢弃, 不重试.

use std::time::Duration;

use tracing::{info, warn};

use super::Event;
use crate::config::ApiConfig;

/// 事件接收端统一接口
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &Event);
}

/// HTTP POST `{api_url}/events`
pub struct HttpEventSink {
    agent: ureq::Agent,
    url: String,
}

impl HttpEventSink {
    pub fn new(config: &ApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            agent,
            url: format!("{}/events", config.url.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn dump_locally(event: &Event) {
        let body = serde_json::to_string_pretty(event).unwrap_or_else(|_| format!("{:?}", event));
        let cut = body
            .char_indices()
            .nth(800)
            .map(|(i, _)| i)
            .unwrap_or(body.len());
        info!("undelivered event:\n{}", &body[..cut]);
    }
}

impl EventSink for HttpEventSink {
    fn publish(&self, event: &Event) {
        let body = match serde_json::to_string(event) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "❌ 事件序列化失败");
                return;
            }
        };

        let result = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body);

        match result {
            Ok(resp) => {
                info!(
                    status = resp.status(),
                    camera = %event.camera_id,
                    event_type = %event.event_type,
                    "📮 event posted"
                );
            }
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                warn!(
                    status = code,
                    url = %self.url,
                    body = %text.chars().take(500).collect::<String>(),
                    "⚠️ event API rejected event"
                );
                Self::dump_locally(event);
            }
            Err(e) => {
                warn!(error = %e, url = %self.url, "⚠️ event POST failed, dropping");
                Self::dump_locally(event);
            }
        }
    }
}

/// 通道接收端 (嵌入/测试)
impl EventSink for crossbeam_channel::Sender<Event> {
    fn publish(&self, event: &Event) {
        if self.send(event.clone()).is_err() {
            warn!(camera = %event.camera_id, "event channel closed, dropping");
        }
    }
}
