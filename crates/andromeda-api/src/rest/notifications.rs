// Notification endpoints consumed by the realtime layer.
//
// Only request builders live here: these calls are authenticated, so
// they are sent through the auth interceptor in `andromeda-core` rather
// than straight through `ApiClient::execute`.

use serde_json::json;

use crate::rest::client::ApiRequest;

/// `GET notifications/unread-count/` -- body `{ "unread_count": n }`.
pub fn unread_count() -> ApiRequest {
    ApiRequest::get("notifications/unread-count/")
}

/// `POST notifications/mark-all-read/`.
pub fn mark_all_read() -> ApiRequest {
    ApiRequest::post("notifications/mark-all-read/", json!({}))
}

/// `POST notifications/{id}/read/`.
pub fn mark_read(notification_id: u64) -> ApiRequest {
    ApiRequest::post(format!("notifications/{notification_id}/read/"), json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_paths() {
        assert_eq!(unread_count().path(), "notifications/unread-count/");
        assert_eq!(*mark_all_read().method(), reqwest::Method::POST);
        assert_eq!(mark_read(9).path(), "notifications/9/read/");
    }
}
