//! End-to-end API tests driving the full pipeline through the router.
//! These need a working Docker daemon and are skipped without one.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use faas_core::Config;
use faas_server::create_app;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;

const BOUNDARY: &str = "X-FAAS-E2E-BOUNDARY";

fn docker_available() -> bool {
    if which::which("docker").is_err() {
        return false;
    }
    Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn test_config() -> Config {
    Config {
        template_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../templates"),
        ..Config::default()
    }
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn multipart_body(archive: &[u8], name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"code\"; filename=\"code.zip\"\r\nContent-Type: application/zip\r\n\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(archive);
    body.extend_from_slice(
        format!(
            "\r\n--{}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{}\r\n--{}--\r\n",
            BOUNDARY, name, BOUNDARY
        )
        .as_bytes(),
    );
    body
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn submit_then_execute_roundtrip() {
    if !docker_available() {
        eprintln!("Skipping test: docker not available");
        return;
    }

    let app = create_app(test_config());

    let archive = zip_bytes(&[("app.py", "print('hello from faas')\n")]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/submit")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(&archive, "hello")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let submission = body_json(response).await;
    let function_id = submission["functionId"].as_str().unwrap().to_string();
    assert!(!function_id.is_empty());
    assert!(!submission["imageId"].as_str().unwrap().is_empty());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/execute?functionId={}", function_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let execution = body_json(response).await;
    assert!(execution["output"]
        .as_str()
        .unwrap()
        .contains("hello from faas"));
    assert!(execution["executedAt"].as_i64().unwrap() > 0);

    // The invocation timestamp must land on the stored metadata.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/functions/{}", function_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let metadata = body_json(response).await;
    assert!(metadata["lastExecuted"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn submission_without_a_handler_is_a_client_error() {
    let app = create_app(test_config());

    let archive = zip_bytes(&[("readme.md", "# nothing runnable\n")]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/submit")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(&archive, "empty")))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
