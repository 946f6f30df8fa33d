use super::control::{AccessPoint, ConnectionInfo, NetworkProfile, SavedProfile, WifiControl};
use crate::error::{PapertrailError, PapertrailResult};

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Output;
use tokio::process::Command;

/// `WifiControl` over NetworkManager's nmcli in terse (`-t`) mode.
pub struct NmcliControl {
    interface: String,
}

impl NmcliControl {
    /// Picks the first wifi-type device NetworkManager reports.
    pub async fn detect() -> PapertrailResult<Self> {
        let output = run_nmcli(&["-t", "-f", "DEVICE,TYPE", "device"]).await?;
        let listing = expect_success(output, PapertrailError::ControlPlaneUnavailable)?;

        for line in listing.lines() {
            let fields = split_terse(line);
            if fields.get(1).map(String::as_str) == Some("wifi") && !fields[0].is_empty() {
                log::info!("Using WiFi interface {}", fields[0]);
                return Ok(NmcliControl {
                    interface: fields[0].clone(),
                });
            }
        }

        log::error!("NetworkManager reports no WiFi device");
        Err(PapertrailError::ControlPlaneUnavailable)
    }

    pub fn with_interface(interface: impl Into<String>) -> Self {
        NmcliControl {
            interface: interface.into(),
        }
    }
}

#[async_trait]
impl WifiControl for NmcliControl {
    async fn scan(&self) -> PapertrailResult<Vec<AccessPoint>> {
        let output = run_nmcli(&[
            "-t",
            "-f",
            "SSID,SIGNAL,SECURITY,FREQ",
            "device",
            "wifi",
            "list",
            "--rescan",
            "yes",
        ])
        .await?;
        let listing = expect_success(output, PapertrailError::ScanFailed)?;

        let mut access_points = Vec::new();
        for line in listing.lines() {
            let fields = split_terse(line);
            if fields.len() < 4 || fields[0].is_empty() {
                continue;
            }
            access_points.push(AccessPoint {
                ssid: fields[0].clone(),
                signal: fields[1].parse().unwrap_or(0),
                security: fields[2].clone(),
                frequency_mhz: parse_frequency(&fields[3]),
            });
        }
        Ok(access_points)
    }

    async fn current_connection(&self) -> PapertrailResult<Option<ConnectionInfo>> {
        let output = run_nmcli(&["-t", "-f", "ACTIVE,SSID,SIGNAL", "device", "wifi"]).await?;
        let listing = expect_success(output, PapertrailError::ScanFailed)?;

        let Some(active) = listing
            .lines()
            .map(split_terse)
            .find(|fields| fields.first().map(String::as_str) == Some("yes"))
        else {
            return Ok(None);
        };

        if active.len() < 3 || active[1].is_empty() {
            return Ok(None);
        }

        let mut info = ConnectionInfo {
            ssid: active[1].clone(),
            ip_address: None,
            mac_address: None,
            signal: active[2].parse().unwrap_or(0),
        };

        // Address details are best-effort; the ssid alone is enough for the
        // state machine.
        match run_nmcli(&[
            "-t",
            "-f",
            "GENERAL.HWADDR,IP4.ADDRESS",
            "device",
            "show",
            &self.interface,
        ])
        .await
        {
            Ok(output) if output.status.success() => {
                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    let fields = split_terse(line);
                    if fields.len() < 2 || fields[1].is_empty() {
                        continue;
                    }
                    if fields[0] == "GENERAL.HWADDR" {
                        info.mac_address = Some(fields[1].clone());
                    } else if fields[0].starts_with("IP4.ADDRESS") {
                        let address = fields[1]
                            .split_once('/')
                            .map_or(fields[1].as_str(), |(ip, _)| ip);
                        info.ip_address = Some(address.to_string());
                    }
                }
            }
            Ok(output) => {
                log::debug!(
                    "device show failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => log::debug!("device show failed: {e}"),
        }

        Ok(Some(info))
    }

    async fn connect(&self, ssid: &str, password: &str) -> PapertrailResult<()> {
        let output = run_nmcli(&[
            "device", "wifi", "connect", ssid, "password", password, "ifname", &self.interface,
        ])
        .await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        log::error!("nmcli connect failed: {}", stderr.trim());
        Err(classify_connect_error(&stderr))
    }

    async fn disconnect(&self) -> PapertrailResult<()> {
        let output = run_nmcli(&["device", "disconnect", &self.interface]).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not active") {
            log::debug!("Disconnect requested while not connected");
            return Ok(());
        }
        log::error!("nmcli disconnect failed: {}", stderr.trim());
        Err(PapertrailError::ConnectionFailed)
    }

    async fn is_visible(&self, ssid: &str) -> PapertrailResult<bool> {
        let output = run_nmcli(&[
            "-t", "-f", "SSID", "device", "wifi", "list", "--rescan", "yes",
        ])
        .await?;
        let listing = expect_success(output, PapertrailError::ScanFailed)?;

        Ok(listing
            .lines()
            .any(|line| split_terse(line).first().map(String::as_str) == Some(ssid)))
    }

    async fn activate(&self, ssid: &str) -> PapertrailResult<()> {
        let output = run_nmcli(&["connection", "up", "id", ssid]).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        log::error!("nmcli connection up failed: {}", stderr.trim());
        if stderr.contains("unknown connection") {
            return Err(PapertrailError::NetworkNotFound);
        }
        Err(PapertrailError::ConnectionFailed)
    }

    async fn list_saved(&self) -> PapertrailResult<Vec<SavedProfile>> {
        let output = run_nmcli(&[
            "-t",
            "-f",
            "NAME,TYPE,AUTOCONNECT,AUTOCONNECT-PRIORITY",
            "connection",
            "show",
        ])
        .await?;
        let listing = expect_success(output, PapertrailError::ControlPlaneUnavailable)?;

        let mut profiles = Vec::new();
        for line in listing.lines() {
            let fields = split_terse(line);
            if fields.len() < 4 || !fields[1].contains("wireless") {
                continue;
            }
            profiles.push(SavedProfile {
                ssid: fields[0].clone(),
                auto_connect: fields[2] == "yes",
                priority: fields[3].parse().unwrap_or(0),
            });
        }
        Ok(profiles)
    }

    async fn remove_saved(&self, ssid: &str) -> PapertrailResult<()> {
        let output = run_nmcli(&["connection", "delete", "id", ssid]).await?;

        if output.status.success() {
            return Ok(());
        }
        log::error!(
            "nmcli connection delete failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Err(PapertrailError::NetworkNotFound)
    }

    async fn save_profile(&self, profile: &NetworkProfile) -> PapertrailResult<()> {
        let auto_connect = if profile.auto_connect { "yes" } else { "no" };
        let mut args = vec![
            "connection",
            "add",
            "type",
            "wifi",
            "ifname",
            self.interface.as_str(),
            "con-name",
            profile.ssid.as_str(),
            "ssid",
            profile.ssid.as_str(),
            "autoconnect",
            auto_connect,
        ];
        if let Some(password) = &profile.password {
            args.extend_from_slice(&[
                "wifi-sec.key-mgmt",
                "wpa-psk",
                "wifi-sec.psk",
                password.as_str(),
            ]);
        }

        let output = run_nmcli(&args).await?;
        if output.status.success() {
            return Ok(());
        }
        log::error!(
            "nmcli connection add failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Err(PapertrailError::ConnectionFailed)
    }
}

async fn run_nmcli(args: &[&str]) -> PapertrailResult<Output> {
    Command::new("nmcli").args(args).output().await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            log::error!("nmcli is not installed");
            PapertrailError::ControlPlaneUnavailable
        } else {
            PapertrailError::IoError(e)
        }
    })
}

fn expect_success(output: Output, failure: PapertrailError) -> PapertrailResult<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        log::error!(
            "nmcli failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Err(failure)
    }
}

fn classify_connect_error(stderr: &str) -> PapertrailError {
    if stderr.contains("Secrets were required") || stderr.contains("no secrets provided") {
        PapertrailError::AuthFailed
    } else if stderr.contains("No network with SSID") {
        PapertrailError::NetworkNotFound
    } else {
        PapertrailError::ConnectionFailed
    }
}

/// Splits one line of `nmcli -t` output, honoring `\:` escapes inside
/// field values (colons are legal in ssids and mac addresses).
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ':' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

fn parse_frequency(field: &str) -> u32 {
    field
        .split_whitespace()
        .next()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terse_fields_split_on_unescaped_colons() {
        assert_eq!(split_terse("yes:CoffeeShop:78"), vec!["yes", "CoffeeShop", "78"]);
    }

    #[test]
    fn escaped_colons_stay_inside_fields() {
        let fields = split_terse(r"GENERAL.HWADDR:AA\:BB\:CC\:DD\:EE\:FF");
        assert_eq!(fields, vec!["GENERAL.HWADDR", "AA:BB:CC:DD:EE:FF"]);
    }

    #[test]
    fn frequency_drops_the_unit_suffix() {
        assert_eq!(parse_frequency("2412 MHz"), 2412);
        assert_eq!(parse_frequency("garbage"), 0);
    }

    #[test]
    fn connect_errors_are_classified_by_stderr() {
        assert!(matches!(
            classify_connect_error("Error: Connection activation failed: Secrets were required, but were not provided."),
            PapertrailError::AuthFailed
        ));
        assert!(matches!(
            classify_connect_error("Error: No network with SSID 'Papertrail-Setup' found."),
            PapertrailError::NetworkNotFound
        ));
        assert!(matches!(
            classify_connect_error("Error: Connection activation failed: Device disconnected"),
            PapertrailError::ConnectionFailed
        ));
    }
}
