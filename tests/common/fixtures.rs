//! Log fixtures and mock CDN helpers

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build an access log with `hits` lines for `needle` interleaved with noise
pub fn access_log(needle: &str, hits: usize, noise: usize) -> String {
    let mut log = String::new();
    for i in 0..hits.max(noise) {
        if i < noise {
            log.push_str(&format!(
                "[01/May/2024:00:00:{:02} +0000] 198.51.100.{} - GET /static/{}.css 200\n",
                i % 60,
                i % 250,
                i
            ));
        }
        if i < hits {
            log.push_str(&format!(
                "[01/May/2024:00:01:{:02} +0000] {} - GET /page/{} 200\n",
                i % 60,
                needle,
                i
            ));
        }
    }
    log
}

/// Gzip `data` as a single member
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("write to gzip encoder");
    encoder.finish().expect("finish gzip stream")
}

/// Gzip each part as its own member and concatenate them
pub fn gzip_members(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|part| gzip(part)).collect()
}

/// Serve `body` at `route` with status 200
pub async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Serve `status` with an empty body at `route`
pub async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
