//! Self-contained offline document served when a navigation has neither
//! network nor cache.
//!
//! The page must render without fetching anything: styles and script are
//! inline, and it reloads itself once the browser reports connectivity.

use swcache_core::Response;

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Offline</title>
  <style>
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: white;
      display: flex;
      align-items: center;
      justify-content: center;
      min-height: 100vh;
      text-align: center;
      padding: 20px;
    }
    .container { max-width: 500px; }
    h1 { font-size: 2.5rem; margin-bottom: 1rem; }
    p { font-size: 1.2rem; margin-bottom: 2rem; line-height: 1.6; }
    button {
      background: white;
      color: #667eea;
      border: none;
      padding: 1rem 2.5rem;
      font-size: 1.1rem;
      font-weight: 600;
      border-radius: 50px;
      cursor: pointer;
    }
    .status { margin-top: 2rem; padding: 1rem; background: rgba(255,255,255,0.1); border-radius: 10px; }
    .online { display: none; color: #4ade80; }
  </style>
</head>
<body>
  <div class="container" id="offline-indicator">
    <h1>No Connection</h1>
    <p>You appear to be offline. Check your internet connection and try again.</p>
    <button onclick="location.reload()">Try again</button>
    <div class="status">
      <div class="offline">Offline</div>
      <div class="online">Online - reloading...</div>
    </div>
  </div>
  <script>
    window.addEventListener('online', function () {
      document.querySelector('.offline').style.display = 'none';
      document.querySelector('.online').style.display = 'block';
      setTimeout(function () { location.reload(); }, 1000);
    });
    window.addEventListener('offline', function () {
      document.querySelector('.offline').style.display = 'block';
      document.querySelector('.online').style.display = 'none';
    });
  </script>
</body>
</html>"#;

/// The offline document as a 200 `text/html` response.
pub fn offline_response() -> Response {
    Response::synthetic(200, "text/html; charset=utf-8", OFFLINE_PAGE)
}
