//! Bundled upload frontend

/// A static file compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    pub content_type: &'static str,
    pub body: &'static str,
}

const INDEX: Asset = Asset {
    content_type: "text/html; charset=utf-8",
    body: include_str!("../frontend/index.html"),
};

const SCRIPT: Asset = Asset {
    content_type: "application/javascript; charset=utf-8",
    body: include_str!("../frontend/script.js"),
};

const STYLE: Asset = Asset {
    content_type: "text/css; charset=utf-8",
    body: include_str!("../frontend/style.css"),
};

/// Look up the asset served at `path`
pub fn lookup(path: &str) -> Option<Asset> {
    match path {
        "/" | "/index.html" => Some(INDEX),
        "/script.js" => Some(SCRIPT),
        "/style.css" => Some(STYLE),
        _ => None,
    }
}
