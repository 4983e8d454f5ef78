use anyhow::{anyhow, Result};
use reqwest::{header, Client};
use serde_json::json;
use tracing::{debug, info, warn};

use shared_config::AppConfig;

use crate::models::Patient;

/// Sends transactional email through the configured email API.
pub struct WelcomeEmailService {
    http_client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl WelcomeEmailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http_client: Client::new(),
            api_url: config.email_api_url.trim_end_matches('/').to_string(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
        }
    }

    /// Best-effort welcome email; any failure is logged and reported as `false`.
    pub async fn send_welcome(&self, patient: &Patient) -> bool {
        let Some(email) = patient.email.as_deref().filter(|email| !email.trim().is_empty()) else {
            debug!("Patient {} has no email address, skipping welcome email", patient.id);
            return false;
        };

        match self.deliver(email, patient).await {
            Ok(()) => {
                info!("Welcome email sent to patient {}", patient.id);
                true
            }
            Err(e) => {
                warn!("Failed to send welcome email to patient {}: {}", patient.id, e);
                false
            }
        }
    }

    async fn deliver(&self, email: &str, patient: &Patient) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(anyhow!("EMAIL_API_KEY is not configured"));
        }

        let payload = json!({
            "from": self.from,
            "to": [email],
            "subject": "Welcome to Our Healthcare Center",
            "html": welcome_html(&patient.full_name, &patient.id),
        });

        let response = self.http_client.post(format!("{}/emails", self.api_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("email API returned {}: {}", status, body));
        }

        Ok(())
    }
}

fn welcome_html(name: &str, patient_id: &str) -> String {
    format!(
        "<!DOCTYPE html>\
         <html><body style=\"font-family: Arial, sans-serif; line-height: 1.6;\">\
         <h1>Welcome to Our Healthcare Center</h1>\
         <p>Dear {name},</p>\
         <p>Thank you for registering with us. Your patient record has been created.</p>\
         <p><strong>Your Patient ID:</strong> {patient_id}</p>\
         <p>Please keep this ID for future reference and bring it to your appointments.</p>\
         <p>Best regards,<br>The Healthcare Team</p>\
         </body></html>",
        name = html_escape(name),
        patient_id = html_escape(patient_id),
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_html_escapes_name() {
        let html = welcome_html("<b>Sean</b> & co", "p-1");
        assert!(html.contains("&lt;b&gt;Sean&lt;/b&gt; &amp; co"));
        assert!(html.contains("p-1"));
    }
}
