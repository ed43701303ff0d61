//! # Update Pipeline
//!
//! One run: fetch the descriptor, pick a resolution, resolve and download the
//! asset, embed metadata, store it, set it as the background.
//!
//! Every step needs the previous step's output, so they run strictly in
//! order. The whole sequence, including storing the file and talking to the
//! desktop, is bounded by a single timeout: every step awaits rather than
//! blocks, and child processes are killed when the run is dropped. The
//! background is only touched by the final step, so a run that times out
//! earlier leaves the previous background in place.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;

use crate::asset;
use crate::background::{self, BackgroundSettingsStore};
use crate::bing::BingClient;
use crate::config::Config;
use crate::display::{self, DisplayInfoProvider};
use crate::error::{PipelineError, Result};
use crate::metadata;
use crate::store::ImageStore;

pub struct Pipeline {
    config: Config,
    display: Arc<dyn DisplayInfoProvider>,
    background: Arc<dyn BackgroundSettingsStore>,
    /// Fixed storage date; `None` means today in local time.
    date: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        display: Arc<dyn DisplayInfoProvider>,
        background: Arc<dyn BackgroundSettingsStore>,
    ) -> Self {
        Self {
            config,
            display,
            background,
            date: None,
        }
    }

    /// Stores under `date` instead of today.
    #[cfg(test)]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Runs the whole update, returning the stored image path.
    #[tracing::instrument(name = "update", skip_all, fields(market = %self.config.market))]
    pub async fn run(&self) -> Result<PathBuf> {
        let timeout = self.config.timeout();

        // Dropping the inner future on timeout closes any open connection
        match tokio::time::timeout(timeout, self.run_steps()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::TimedOut {
                operation: "background update",
                after: timeout,
            }),
        }
    }

    async fn run_steps(&self) -> Result<PathBuf> {
        let client = BingClient::new(&self.config)?;

        let descriptor = client.fetch_descriptor().await?;
        tracing::info!(title = %descriptor.title, "today's image");

        let resolution = display::select_resolution(self.display.as_ref()).await;
        let asset = asset::resolve(&client, &descriptor, resolution).await?;
        let image = client.download(&asset).await?;

        let tagged = metadata::embed(image, &descriptor)?;

        let date = self.date.unwrap_or_else(|| chrono::Local::now().date_naive());
        let path = ImageStore::new(self.config.pictures_root()).store(tagged, date).await?;

        background::apply(self.background.as_ref(), &path, self.config.style).await?;
        tracing::info!(path = %path.display(), "background updated");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::tests::RecordingStore;
    use crate::background::PicturePosition;
    use crate::config::DisplaySize;
    use crate::display::FixedDisplay;
    use axum::extract::{Query, State};
    use axum::http::{header, Method, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    const ARCHIVE: &str = r#"{"images":[{"urlbase":"/th?id=abc","copyright":"Northern Lights (Photographer X)","title":"Aurora"}]}"#;

    /// In-process stand-in for the Bing endpoints.
    #[derive(Default)]
    struct FakeBing {
        archive: String,
        archive_delay: Option<Duration>,
        /// `id` query values that resolve to an image
        available: Vec<String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeBing {
        fn new(available: &[&str]) -> Self {
            Self {
                archive: ARCHIVE.to_string(),
                available: available.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(32, 18, image::Rgb([20, 60, 120]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    async fn archive(State(fake): State<Arc<FakeBing>>, uri: Uri) -> Response {
        fake.requests.lock().unwrap().push(format!("GET {uri}"));
        if let Some(delay) = fake.archive_delay {
            tokio::time::sleep(delay).await;
        }
        ([(header::CONTENT_TYPE, "application/json")], fake.archive.clone()).into_response()
    }

    async fn image(
        State(fake): State<Arc<FakeBing>>,
        method: Method,
        uri: Uri,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        fake.requests.lock().unwrap().push(format!("{method} {uri}"));
        let found = query.get("id").is_some_and(|id| fake.available.contains(id));
        if found {
            ([(header::CONTENT_TYPE, "image/jpeg")], sample_jpeg()).into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    async fn serve(fake: Arc<FakeBing>) -> String {
        let app = Router::new()
            .route("/HPImageArchive.aspx", get(archive))
            .route("/th", get(image))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    struct Harness {
        pipeline: Pipeline,
        background: Arc<RecordingStore>,
        root: tempfile::TempDir,
    }

    async fn harness(fake: Arc<FakeBing>, display: DisplaySize, timeout_secs: u64) -> Harness {
        harness_with(fake, display, timeout_secs, RecordingStore::default()).await
    }

    async fn harness_with(
        fake: Arc<FakeBing>,
        display: DisplaySize,
        timeout_secs: u64,
        background: RecordingStore,
    ) -> Harness {
        let host = serve(fake).await;
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            service_host: host,
            pictures_dir: Some(root.path().to_path_buf()),
            timeout_secs,
            ..Config::default()
        };
        let background = Arc::new(background);
        let pipeline = Pipeline::new(config, Arc::new(FixedDisplay(display)), background.clone())
            .with_date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        Harness {
            pipeline,
            background,
            root,
        }
    }

    const UHD: DisplaySize = DisplaySize { width: 3840, height: 2160 };
    const FULL_HD: DisplaySize = DisplaySize { width: 1920, height: 1080 };

    #[tokio::test]
    async fn end_to_end_high_density() {
        let fake = Arc::new(FakeBing::new(&["abc_UHD.jpg"]));
        let h = harness(fake.clone(), UHD, 10).await;

        let path = h.pipeline.run().await.unwrap();

        assert_eq!(path, h.root.path().join("Bing Backgrounds/2024/3-15-2024.jpeg"));
        assert!(fake
            .requests()
            .contains(&"HEAD /th?id=abc_UHD.jpg&w=3840&h=2160&rs=1&c=4".to_string()));

        let meta = metadata::read_metadata(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Aurora"));
        assert_eq!(meta.subject.as_deref(), Some("Northern Lights"));
        assert_eq!(meta.copyright.as_deref(), Some("Photographer X"));

        let calls = h.background.calls();
        assert_eq!(calls.len(), 2);
        let (_, settings) = &calls[0];
        assert_eq!(settings.style, PicturePosition::Fill);
        assert_eq!(settings.position_code(), 10);
        assert!(!settings.tile());
        assert_eq!(settings.image_path, path);
    }

    #[tokio::test]
    async fn probes_before_downloading_once() {
        let fake = Arc::new(FakeBing::new(&["abc_UHD.jpg"]));
        let h = harness(fake.clone(), FULL_HD, 10).await;

        h.pipeline.run().await.unwrap();

        let requests = fake.requests();
        let image_requests: Vec<_> = requests.iter().filter(|r| r.contains("/th?")).collect();
        assert_eq!(
            image_requests,
            vec![
                "HEAD /th?id=abc_UHD.jpg&w=1920&h=1080&rs=1&c=4",
                "GET /th?id=abc_UHD.jpg&w=1920&h=1080&rs=1&c=4",
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_default_asset() {
        let fake = Arc::new(FakeBing::new(&["abc_1920x1080.jpg"]));
        let h = harness(fake.clone(), UHD, 10).await;

        let path = h.pipeline.run().await.unwrap();

        assert!(path.exists());
        assert!(fake.requests().contains(&"GET /th?id=abc_1920x1080.jpg".to_string()));
    }

    #[tokio::test]
    async fn missing_asset_changes_nothing() {
        let fake = Arc::new(FakeBing::new(&[]));
        let h = harness(fake, UHD, 10).await;

        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::AssetNotFound { .. }), "{err:?}");
        assert!(!h.root.path().join("Bing Backgrounds").exists());
        assert!(h.background.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_metadata_is_a_parse_error() {
        let fake = Arc::new(FakeBing {
            archive: r#"{"images":[{"title":"no urlbase"}]}"#.to_string(),
            ..FakeBing::new(&["abc_UHD.jpg"])
        });
        let h = harness(fake, UHD, 10).await;

        let err = h.pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn slow_metadata_times_out_without_side_effects() {
        let fake = Arc::new(FakeBing {
            archive_delay: Some(Duration::from_secs(5)),
            ..FakeBing::new(&["abc_UHD.jpg"])
        });
        let h = harness(fake, UHD, 1).await;

        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::TimedOut { .. }), "{err:?}");
        assert!(!h.root.path().join("Bing Backgrounds").exists());
        assert!(h.background.calls().is_empty());
    }

    #[tokio::test]
    async fn slow_desktop_is_bounded_by_the_run_timeout() {
        let fake = Arc::new(FakeBing::new(&["abc_UHD.jpg"]));
        let slow = RecordingStore {
            write_delay: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        let h = harness_with(fake, UHD, 1, slow).await;

        let started = std::time::Instant::now();
        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, PipelineError::TimedOut { operation: "background update", .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert!(h.background.calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config {
            service_host: format!("http://{addr}"),
            timeout_secs: 5,
            ..Config::default()
        };
        let pipeline = Pipeline::new(
            config,
            Arc::new(FixedDisplay(FULL_HD)),
            Arc::new(RecordingStore::default()),
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport { .. }), "{err:?}");
    }
}
