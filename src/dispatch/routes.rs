// aegis-push/src/dispatch/routes.rs

/// Endpoints Safari calls under `webServiceURL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/v{n}/pushPackages/{websitePushID}`
    PushPackages { version: u32, website_push_id: String },
    /// `/v{n}/devices/{deviceToken}/registrations/{websitePushID}`
    Registration {
        version: u32,
        device_token: String,
        website_push_id: String,
    },
    /// `/v{n}/log`
    Log { version: u32 },
}

impl Route {
    /// Matches the first `v{n}` segment followed by a known action, so the
    /// service can be mounted under any path prefix.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        (0..segments.len()).find_map(|start| Self::parse_segments(&segments[start..]))
    }

    fn parse_segments(segments: &[&str]) -> Option<Self> {
        let (version, rest) = segments.split_first()?;
        let version = parse_version(version)?;
        match rest {
            ["pushPackages", website_push_id] => Some(Self::PushPackages {
                version,
                website_push_id: website_push_id.to_string(),
            }),
            ["devices", device_token, "registrations", website_push_id] => {
                Some(Self::Registration {
                    version,
                    device_token: device_token.to_string(),
                    website_push_id: website_push_id.to_string(),
                })
            }
            ["log"] => Some(Self::Log { version }),
            _ => None,
        }
    }
}

pub fn is_apple_action(path: &str) -> bool {
    Route::parse(path).is_some()
}

fn parse_version(segment: &str) -> Option<u32> {
    let digits = segment.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
