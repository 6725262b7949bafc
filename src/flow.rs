//! 흐름 제어 (백프레셔)
//!
//! 채널의 미전송 버퍼 바이트 수만 읽어서 송신을 조절한다.
//! - high water mark 이상: 과부하
//! - high / 2 미만: 송신 허용
//!
//! 채널이 "버퍼 감소" 알림을 주면 그 알림으로 깨어나고,
//! 폴링 간격은 알림이 없는 채널을 위한 보조 수단으로 남긴다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::channel::DataChannel;
use crate::config::AdmissionPolicy;
use crate::retry::CancelToken;
use crate::{Config, Error, Result};

/// 흐름 제어기
pub struct FlowController<C> {
    channel: Arc<C>,
    high_water_mark: usize,
    poll_interval: Duration,
    throttle_delay: Duration,
}

impl<C: DataChannel> FlowController<C> {
    pub fn new(channel: Arc<C>, config: &Config) -> Self {
        Self {
            channel,
            high_water_mark: config.high_water_mark,
            poll_interval: config.poll_interval(),
            throttle_delay: config.throttle_delay(),
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn low_water_mark(&self) -> usize {
        self.high_water_mark / 2
    }

    /// 버퍼가 high water mark 이상인지
    pub fn is_over_capacity(&self) -> bool {
        self.channel.buffered_amount() >= self.high_water_mark
    }

    fn has_admission(&self) -> bool {
        self.channel.buffered_amount() < self.low_water_mark()
    }

    /// 버퍼가 low water mark 아래로 내려갈 때까지 대기
    ///
    /// 채널이 open이 아니게 되면 바로 반환한다. 상태 확인은 호출자 몫이다.
    pub async fn await_admission(&self, cancel: &CancelToken) -> Result<()> {
        let mut waited = false;

        loop {
            // 확인 전에 등록해야 확인과 대기 사이의 알림을 놓치지 않는다
            let notified = self.channel.buffered_amount_low().map(|n| n.notified());

            if self.has_admission() {
                if waited {
                    debug!("송신 재개: buffered={}", self.channel.buffered_amount());
                }
                return Ok(());
            }
            if !self.channel.is_open() {
                debug!("채널 {:?}: 대기 중단", self.channel.ready_state());
                return Ok(());
            }
            cancel.check()?;

            if !waited {
                debug!(
                    "백프레셔 대기: buffered={}, low={}",
                    self.channel.buffered_amount(),
                    self.low_water_mark()
                );
                waited = true;
            }

            match notified {
                Some(notified) => {
                    tokio::select! {
                        _ = notified => trace!("버퍼 감소 알림"),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                }
                None => cancel.sleep(self.poll_interval).await?,
            }
        }
    }

    /// 과부하면 한 번만 대기 (이후 송신은 그대로 진행)
    pub async fn throttle(&self, cancel: &CancelToken) -> Result<()> {
        if self.is_over_capacity() {
            debug!(
                "과부하: buffered={}, {}ms 대기 후 송신",
                self.channel.buffered_amount(),
                self.throttle_delay.as_millis()
            );
            cancel.sleep(self.throttle_delay).await?;
        }
        Ok(())
    }

    /// 정책에 따른 송신 허용 절차
    pub async fn admit(&self, policy: AdmissionPolicy, cancel: &CancelToken) -> Result<()> {
        match policy {
            AdmissionPolicy::Blocking => self.await_admission(cancel).await,
            AdmissionPolicy::BestEffort => self.throttle(cancel).await,
        }
    }
}
