//! CTP 루프백 데모 - 인프로세스 채널로 송신/수신/재조립
//!
//! 한 프로세스 안에서 송신측과 수신측을 루프백 채널로 연결해
//! 파일(또는 합성 캡처)을 전송하고, 수신된 청크로 결과물을 재조립한다.
//!
//! 사용법:
//!   cargo run --release --bin ctp-loopback -- [OPTIONS]
//!
//! 예시:
//!   # 파일 전송 후 결과물 저장
//!   cargo run --release --bin ctp-loopback -- --file input.webm --output ./out
//!
//!   # 5초간 합성 캡처 전송, 10% 손실
//!   cargo run --release --bin ctp-loopback -- --capture 5 --loss 0.1

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ctp::{
    AdmissionPolicy, CaptureStream, ChunkReader, Config, Error, LinkConfig, MemoryChannel,
    MemorySource, Receiver, Sender, SyntheticCapture, TransferStats,
};

/// 입력 종류
enum Input {
    File(PathBuf),
    Capture(Duration),
    TestData,
}

/// 데모 설정
struct DemoConfig {
    input: Input,
    output_dir: Option<PathBuf>,
    link: LinkConfig,
    config: Config,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            input: Input::TestData,
            output_dir: None,
            link: LinkConfig::default(),
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"CTP Loopback - Chunked Transfer Protocol 데모

인프로세스 루프백 채널로 청크 전송/수신/재조립
- 채널 송신 버퍼 기준 백프레셔
- 일시적 거부 시 지수 백오프 재시도
- 손실률 및 CRC 비교 출력

사용법:
  cargo run --release --bin ctp-loopback -- [OPTIONS]

옵션:
  -f, --file <PATH>       전송할 파일 경로 (기본: 1MB 테스트 데이터)
  -c, --capture <SECS>    합성 캡처를 지정 시간 동안 전송
  -o, --output <DIR>      재조립 결과물 저장 디렉터리
  --chunk-size <BYTES>    청크 크기 (기본: 262144)
  --high-water <BYTES>    high water mark (기본: 16777216)
  --interval <MS>         캡처 주기 (기본: 1000)
  --loss <RATIO>          루프백 메시지 손실 비율 0.0~1.0 (기본: 0)
  --policy <NAME>         흐름 제어: blocking | best-effort (모든 소스에 적용)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조절 (기본: info)
"#;

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 값 필요", flag))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{}: 유효한 숫자 필요 ({})", flag, raw))
}

fn parse_args() -> Result<DemoConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut demo = DemoConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--file" | "-f" => {
                demo.input = Input::File(PathBuf::from(value(&args, i, flag)?));
                i += 1;
            }
            "--capture" | "-c" => {
                let secs: u64 = number(value(&args, i, flag)?, flag)?;
                demo.input = Input::Capture(Duration::from_secs(secs));
                i += 1;
            }
            "--output" | "-o" => {
                demo.output_dir = Some(PathBuf::from(value(&args, i, flag)?));
                i += 1;
            }
            "--chunk-size" => {
                demo.config.chunk_size = number(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--high-water" => {
                demo.config.high_water_mark = number(value(&args, i, flag)?, flag)?;
                demo.link.low_threshold = demo.config.low_water_mark();
                i += 1;
            }
            "--interval" => {
                demo.config.capture_interval_ms = number(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--loss" => {
                demo.link.loss_ratio = number(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--policy" => {
                let policy = match value(&args, i, flag)? {
                    "blocking" => AdmissionPolicy::Blocking,
                    "best-effort" => AdmissionPolicy::BestEffort,
                    other => return Err(format!("알 수 없는 정책: {}", other)),
                };
                demo.config.file_admission = policy;
                demo.config.capture_admission = policy;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => warn!("알 수 없는 옵션 무시: {}", other),
        }
        i += 1;
    }

    Ok(demo)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let demo = parse_args()?;
    demo.config.validate()?;

    info!("CTP Loopback starting...");
    info!("Chunk size: {} bytes", demo.config.chunk_size);
    info!("High water mark: {} bytes", demo.config.high_water_mark);
    info!("Simulated loss: {:.1}%", demo.link.loss_ratio * 100.0);

    // 채널 + 수신측
    let (channel, inbound) = MemoryChannel::pair(demo.link.clone());
    let channel = Arc::new(channel);
    let stats = Arc::new(TransferStats::new());
    let mut receiver = Receiver::new(stats.clone()).spawn(inbound);

    // 송신측 (Ctrl-C로 취소)
    let sender = Sender::new(demo.config.clone(), channel.clone(), stats.clone());
    let cancel = sender.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C: 전송 취소");
            cancel.cancel();
        }
    });

    let (result, source_crc) = match &demo.input {
        Input::File(path) => {
            info!("Loading file: {:?}", path);
            let crc = tokio::fs::read(path).await.ok().map(|d| crc32fast::hash(&d));
            (sender.send_file(path).await, crc)
        }
        Input::TestData => {
            info!("Using test data (1MB)");
            let data: Bytes = (0..1024 * 1024u32).map(|i| (i % 251) as u8).collect();
            let crc = Some(crc32fast::hash(&data));
            let reader = ChunkReader::new(MemorySource::new(data), demo.config.chunk_size);
            (sender.send_source(reader).await, crc)
        }
        Input::Capture(duration) => {
            let device = SyntheticCapture::new(8 * 1024, 64 * 1024);
            let mut stream = CaptureStream::start(device, demo.config.capture_interval())?;
            let stopper = stream.stopper();
            let duration = *duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                info!("Recording stopped.");
                stopper.stop();
            });
            (sender.stream_capture(&mut stream).await, None)
        }
    };

    match result {
        Ok(_) => {}
        Err(Error::Cancelled) => warn!("전송이 취소됨"),
        Err(e) => return Err(e.into()),
    }

    // 남은 버퍼 배출 후 수신 종료
    channel.close();
    receiver.join().await;

    let report = stats.report();
    info!("Transfer complete!");
    info!("  {}", report.summary());
    info!("  Lost on link: {} messages", channel.lost_messages());
    if let Some(rate) = report.loss_rate() {
        info!("  Loss Rate: {:.2}%", rate * 100.0);
    }

    // 재조립
    let artifact = match receiver.reassembler().rebuild() {
        Ok(artifact) => artifact,
        Err(Error::EmptyInput) => {
            warn!("No received chunks available!");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "Rebuilt artifact: {} bytes from {} chunks ({})",
        artifact.len(),
        artifact.chunk_count(),
        artifact.mime_type()
    );
    match source_crc {
        Some(crc) if crc == artifact.crc32() => info!("  CRC32 match: {:08X}", crc),
        Some(crc) => warn!(
            "  CRC32 mismatch: source {:08X}, artifact {:08X}",
            crc,
            artifact.crc32()
        ),
        None => info!("  CRC32: {:08X}", artifact.crc32()),
    }

    if let Some(dir) = &demo.output_dir {
        tokio::fs::create_dir_all(dir).await?;
        let path = artifact.save_to(dir).await?;
        info!("Data saved to {:?}", path);
    }

    Ok(())
}
