use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{de::DeserializeOwned, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use strum::Display;
use tracing::debug;

use super::models::{
    FwVersionResponse, GatewayResponseV3, HubInfo, MoveCommandV3, SceneV3, ScenesResponseV2,
    ShadeCommandV2, ShadeResponseV2, ShadeV3, ShadesResponseV2, UserDataResponse,
};
use super::HubError;
use crate::domain::{SceneInfo, ShadeInfo};

/// PowerView HTTP API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ApiVersion {
    /// Generation 1 and 2 hubs (`/api/...`)
    V2,
    /// Generation 3 gateways (`/home/...`)
    V3,
}

/// HTTP client bound to a single hub
#[derive(Clone)]
pub struct PowerviewClient {
    base_url: String,
    client: reqwest::Client,
    version: ApiVersion,
}

pub fn base_url(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("http://[{v6}]:{port}"),
        _ => format!("http://{address}:{port}"),
    }
}

impl PowerviewClient {
    /// Connect to the hub at `address` and detect its API generation
    pub async fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self, HubError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("intg-powerview/0.3"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        let base_url = base_url(address, port);
        let version = Self::detect_version(&client, &base_url).await?;
        debug!(%base_url, %version, "detected PowerView API generation");
        Ok(Self {
            base_url,
            client,
            version,
        })
    }

    async fn detect_version(
        client: &reqwest::Client,
        base_url: &str,
    ) -> Result<ApiVersion, HubError> {
        match client.get(format!("{base_url}/gateway/info")).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(ApiVersion::V3),
            Ok(resp) => debug!(status = %resp.status(), "no Gen 3 gateway endpoint"),
            Err(e) if e.is_connect() || e.is_timeout() => return Err(e.into()),
            Err(e) => debug!(error = %e, "Gen 3 probe failed"),
        }

        let path = "/api/fwversion";
        let resp = client.get(format!("{base_url}{path}")).send().await?;
        if resp.status().is_success() {
            Ok(ApiVersion::V2)
        } else {
            Err(HubError::Status {
                status: resp.status(),
                path: path.to_string(),
            })
        }
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HubError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HubError::Status {
                status,
                path: path.to_string(),
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| HubError::Decode(format!("{path}: {e}")))
    }

    async fn put<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<(), HubError> {
        let mut req = self.client.put(format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HubError::Status {
                status,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    pub async fn hub_info(&self) -> Result<HubInfo, HubError> {
        match self.version {
            ApiVersion::V2 => {
                let fw: FwVersionResponse = self.get_json("/api/fwversion").await?;
                let user: UserDataResponse = self.get_json("/api/userdata").await?;
                Ok(user.user_data.into_hub_info(fw.firmware))
            }
            ApiVersion::V3 => {
                let gateway: GatewayResponseV3 = self.get_json("/gateway").await?;
                gateway
                    .config
                    .map(|c| c.into_hub_info())
                    .ok_or_else(|| HubError::Decode("/gateway: missing config".to_string()))
            }
        }
    }

    pub async fn shades(&self) -> Result<Vec<ShadeInfo>, HubError> {
        match self.version {
            ApiVersion::V2 => {
                let raw: ShadesResponseV2 = self.get_json("/api/shades").await?;
                Ok(raw.shade_data.into_iter().map(ShadeInfo::from).collect())
            }
            ApiVersion::V3 => {
                let raw: Vec<ShadeV3> = self.get_json("/home/shades").await?;
                Ok(raw.into_iter().map(ShadeInfo::from).collect())
            }
        }
    }

    /// Ask the hub to re-read one shade's position from the radio network
    pub async fn shade(&self, id: &str) -> Result<ShadeInfo, HubError> {
        match self.version {
            ApiVersion::V2 => {
                let raw: ShadeResponseV2 = self
                    .get_json(&format!("/api/shades/{id}?refresh=true"))
                    .await?;
                Ok(raw.shade.into())
            }
            ApiVersion::V3 => {
                let raw: ShadeV3 = self.get_json(&format!("/home/shades/{id}")).await?;
                Ok(raw.into())
            }
        }
    }

    pub async fn scenes(&self) -> Result<Vec<SceneInfo>, HubError> {
        match self.version {
            ApiVersion::V2 => {
                let raw: ScenesResponseV2 = self.get_json("/api/scenes").await?;
                Ok(raw.scene_data.into_iter().map(SceneInfo::from).collect())
            }
            ApiVersion::V3 => {
                let raw: Vec<SceneV3> = self.get_json("/home/scenes").await?;
                Ok(raw.into_iter().map(SceneInfo::from).collect())
            }
        }
    }

    pub async fn move_shade(&self, id: &str, percent: u8) -> Result<(), HubError> {
        match self.version {
            ApiVersion::V2 => {
                self.put(&format!("/api/shades/{id}"), Some(&ShadeCommandV2::move_to(percent)))
                    .await
            }
            ApiVersion::V3 => {
                self.put(
                    &format!("/home/shades/positions?ids={id}"),
                    Some(&MoveCommandV3::move_to(percent)),
                )
                .await
            }
        }
    }

    pub async fn stop_shade(&self, id: &str) -> Result<(), HubError> {
        match self.version {
            ApiVersion::V2 => {
                self.put(&format!("/api/shades/{id}"), Some(&ShadeCommandV2::stop()))
                    .await
            }
            ApiVersion::V3 => {
                self.put::<()>(&format!("/home/shades/stop?ids={id}"), None)
                    .await
            }
        }
    }

    pub async fn activate_scene(&self, id: &str) -> Result<(), HubError> {
        match self.version {
            ApiVersion::V2 => {
                // Gen 1/2 hubs activate scenes with a GET
                let path = format!("/api/scenes?sceneId={id}");
                let resp = self
                    .client
                    .get(format!("{}{}", self.base_url, path))
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(HubError::Status {
                        status: resp.status(),
                        path,
                    });
                }
                Ok(())
            }
            ApiVersion::V3 => {
                self.put::<()>(&format!("/home/scenes/{id}/activate"), None)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("192.168.1.20", 80), "http://192.168.1.20:80");
        assert_eq!(base_url("fe80::1", 80), "http://[fe80::1]:80");
        assert_eq!(base_url("powerview-hub.local", 8080), "http://powerview-hub.local:8080");
    }
}
