use crate::common::test_client;
use rocket::http::Status;

#[test]
fn health_reports_backend() {
    let client = test_client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "masc-room");
    assert!(body["backend"].as_str().unwrap().contains("Sql"));
}
