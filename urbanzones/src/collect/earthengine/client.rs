use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::collect::earthengine::expr::{Expr, Geometry, Image};
use crate::commons::error::PipelineError;

/// Default REST endpoint of the Earth Engine API
pub const EARTHENGINE_API_URL: &str = "https://earthengine.googleapis.com/v1/";

/// Remote computation service the layer pipeline talks to
///
/// Implemented by [`RestClient`] for the real service; tests provide stubs.
pub trait EarthEngine {
    /// Evaluate an expression and return its JSON result
    fn compute_value(&self, expr: &Expr) -> Result<Value>;

    /// Submit an export job; returns as soon as the service accepts it
    fn start_export(&self, request: &ExportRequest) -> Result<ExportTask>;

    /// Evaluate an expression expected to produce a non-negative integer
    fn compute_count(&self, expr: &Expr) -> Result<u64> {
        let value = self.compute_value(expr)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .with_context(|| format!("Expected a count from the service, got {}", value))
    }
}

/// Raster output formats the export facility accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FileFormat {
    #[default]
    #[serde(rename = "GeoTIFF", alias = "GEO_TIFF")]
    GeoTiff,
    #[serde(rename = "TFRecord", alias = "TF_RECORD_IMAGE")]
    TfRecord,
}

impl FileFormat {
    fn wire_name(&self) -> &'static str {
        match self {
            FileFormat::GeoTiff => "GEO_TIFF",
            FileFormat::TfRecord => "TF_RECORD_IMAGE",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::GeoTiff => "tif",
            FileFormat::TfRecord => "tfrecord",
        }
    }
}

/// Export-to-storage job description
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub image: Image,
    pub description: String,
    pub folder: String,
    pub file_name_prefix: String,
    pub region: Geometry,
    pub scale: f64,
    pub file_format: FileFormat,
}

impl ExportRequest {
    /// Request body for `projects/{project}/image:export`
    pub fn to_body(&self) -> Value {
        let image = self.image.clip_to_bounds_and_scale(&self.region, self.scale);
        json!({
            "expression": image.0.to_expression(),
            "description": self.description,
            "fileExportOptions": {
                "fileFormat": self.file_format.wire_name(),
                "driveDestination": {
                    "folder": self.folder,
                    "filenamePrefix": self.file_name_prefix,
                }
            }
        })
    }
}

/// Handle returned for an accepted export job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportTask {
    /// Long-running operation name, e.g. `projects/p/operations/ABC`
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ComputeValueResponse {
    result: Value,
}

/// Blocking REST client for the Earth Engine API
pub struct RestClient {
    client: Client,
    base_url: Url,
    project: String,
    access_token: String,
}

impl RestClient {
    /// Create a client and perform the single login check
    ///
    /// Fails with [`PipelineError::Authentication`] before any query is issued
    /// when the token is missing or rejected.
    pub fn initialize(base_url: &str, project: &str, access_token: &str) -> Result<Self> {
        if access_token.trim().is_empty() {
            return Err(PipelineError::Authentication(
                "no access token provided".to_string(),
            )
            .into());
        }

        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let rest = RestClient {
            client: Client::new(),
            base_url,
            project: project.to_string(),
            access_token: access_token.trim().to_string(),
        };

        let url = rest.endpoint("algorithms")?;
        log::debug!("Checking Earth Engine credentials against {}", url);
        let response = rest
            .authorized(rest.client.get(url))
            .send()
            .map_err(|e| PipelineError::Authentication(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Authentication(format!("{}: {}", status, body)).into());
        }

        log::info!("Earth Engine initialized for project '{}'", rest.project);
        Ok(rest)
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        let path = format!(
            "projects/{}/{}",
            urlencoding::encode(&self.project),
            method
        );
        self.base_url
            .join(&path)
            .with_context(|| format!("Failed to build endpoint URL for {}", method))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .header("x-goog-user-project", &self.project)
    }

    fn post_json(&self, method: &str, body: &Value) -> Result<reqwest::blocking::Response> {
        let url = self.endpoint(method)?;
        log::debug!("POST {}", url);
        let response = self
            .authorized(self.client.post(url))
            .json(body)
            .send()
            .with_context(|| format!("Failed to send request to Earth Engine ({})", method))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().unwrap_or_default();
            return Err(PipelineError::RemoteService { status, message }.into());
        }
        Ok(response)
    }
}

impl EarthEngine for RestClient {
    fn compute_value(&self, expr: &Expr) -> Result<Value> {
        let body = json!({ "expression": expr.to_expression() });
        let response: ComputeValueResponse = self
            .post_json("value:compute", &body)?
            .json()
            .context("Failed to decode value:compute response")?;
        Ok(response.result)
    }

    fn start_export(&self, request: &ExportRequest) -> Result<ExportTask> {
        let task: ExportTask = self
            .post_json("image:export", &request.to_body())?
            .json()
            .context("Failed to decode image:export response")?;
        Ok(task)
    }
}

/// Offline engine for printing the export graph without credentials
///
/// Every count query answers 1, so boundary and collection checks pass;
/// exports are refused.
pub struct DryRun;

impl EarthEngine for DryRun {
    fn compute_value(&self, expr: &Expr) -> Result<Value> {
        log::debug!("Dry run: assuming one item for {:?}", expr.function_name());
        Ok(json!(1))
    }

    fn start_export(&self, request: &ExportRequest) -> Result<ExportTask> {
        anyhow::bail!("Dry run: export '{}' not submitted", request.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::earthengine::expr::FeatureCollection;
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    struct FixedValue(RefCell<Vec<Value>>);

    impl EarthEngine for FixedValue {
        fn compute_value(&self, _expr: &Expr) -> Result<Value> {
            self.0.borrow_mut().pop().context("no more values")
        }

        fn start_export(&self, _request: &ExportRequest) -> Result<ExportTask> {
            anyhow::bail!("not used")
        }
    }

    #[test]
    fn test_dry_run_counts_one() {
        let count = DryRun.compute_count(&Expr::integer(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_compute_count_accepts_integers_and_floats() {
        let engine = FixedValue(RefCell::new(vec![json!(3.0), json!(7)]));
        let expr = Expr::integer(0);
        assert_eq!(engine.compute_count(&expr).unwrap(), 7);
        assert_eq!(engine.compute_count(&expr).unwrap(), 3);
    }

    #[test]
    fn test_compute_count_rejects_non_numbers() {
        let engine = FixedValue(RefCell::new(vec![json!("seven")]));
        assert!(engine.compute_count(&Expr::integer(0)).is_err());
    }

    #[test]
    fn test_export_body() {
        let body = export_request().to_body();
        assert_eq!(body["fileExportOptions"]["fileFormat"], "GEO_TIFF");
        assert_eq!(
            body["fileExportOptions"]["driveDestination"]["filenamePrefix"],
            "nairobi_master_data"
        );
        let root = &body["expression"]["values"]["0"]["functionInvocationValue"];
        assert_eq!(root["functionName"], "Image.clipToBoundsAndScale");
        assert_eq!(root["arguments"]["scale"]["constantValue"], 200.0);
    }

    /// Serve one canned `(status line, body)` per connection, in order,
    /// returning the request lines seen
    fn spawn_http(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                seen.push(request_line.trim_end().to_string());

                let mut content_length = 0usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim_end().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();

                let mut stream = reader.into_inner();
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(body.as_bytes()).unwrap();
                let _ = stream.flush();
            }
            seen
        });
        (format!("http://{addr}/v1/"), handle)
    }

    fn export_request() -> ExportRequest {
        ExportRequest {
            image: Image::constant(1.0),
            description: "Nairobi_Master_Dataset_GeoTIFF".to_string(),
            folder: "NASA_Space_Apps_Data".to_string(),
            file_name_prefix: "nairobi_master_data".to_string(),
            region: FeatureCollection::load("FAO/GAUL/2015/level2").geometry(),
            scale: 200.0,
            file_format: FileFormat::GeoTiff,
        }
    }

    #[test]
    fn test_rejected_login_is_authentication_error() {
        let (url, server) = spawn_http(vec![(
            "401 Unauthorized",
            r#"{"error": {"code": 401, "status": "UNAUTHENTICATED"}}"#,
        )]);
        let err = RestClient::initialize(&url, "nairobi", "expired-token")
            .err()
            .unwrap();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Authentication(message)) => {
                assert!(message.contains("401"), "{}", message)
            }
            other => panic!("expected an authentication error, got {:?}", other),
        }
        let seen = server.join().unwrap();
        assert_eq!(seen, vec!["GET /v1/projects/nairobi/algorithms HTTP/1.1"]);
    }

    #[test]
    fn test_server_errors_are_remote_service_errors() {
        let (url, server) = spawn_http(vec![
            ("200 OK", r#"{"algorithms": []}"#),
            ("500 Internal Server Error", r#"{"error": "compute failed"}"#),
            ("500 Internal Server Error", r#"{"error": "export failed"}"#),
        ]);
        let client = RestClient::initialize(&url, "nairobi", "token").unwrap();

        let err = client.compute_value(&Expr::integer(0)).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::RemoteService { status, message }) => {
                assert_eq!(*status, 500);
                assert!(message.contains("compute failed"), "{}", message);
            }
            other => panic!("expected a remote service error, got {:?}", other),
        }

        let err = client.start_export(&export_request()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::RemoteService { status: 500, .. })
        ));

        let seen = server.join().unwrap();
        assert_eq!(
            seen,
            vec![
                "GET /v1/projects/nairobi/algorithms HTTP/1.1",
                "POST /v1/projects/nairobi/value:compute HTTP/1.1",
                "POST /v1/projects/nairobi/image:export HTTP/1.1",
            ]
        );
    }

    #[test]
    fn test_initialize_without_token() {
        let err = RestClient::initialize(EARTHENGINE_API_URL, "p", "  ")
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Authentication(_))
        ));
    }
}
