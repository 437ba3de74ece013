use anyhow::{Result, bail};
use ehrbridge_fhir::{FhirGateway, FhirQuery, GatewayError, ParsedResource};

use crate::cli::{GetArgs, OutputFormat};
use crate::output::{print_json, print_resources};

pub async fn beaker(gateway: &FhirGateway, patient: &str, format: OutputFormat) -> Result<()> {
    let reports = gateway
        .get_beaker_reports(patient)
        .await
        .map_err(explain)?;
    print_resources(&reports, format);
    Ok(())
}

pub async fn labs(gateway: &FhirGateway, patient: &str, format: OutputFormat) -> Result<()> {
    let reports = gateway
        .get_all_laboratory_reports(patient)
        .await
        .map_err(explain)?;
    print_resources(&reports, format);
    Ok(())
}

pub async fn genomics(gateway: &FhirGateway, patient: &str, format: OutputFormat) -> Result<()> {
    let observations = gateway
        .get_genomic_observations(patient)
        .await
        .map_err(explain)?;
    print_resources(&observations, format);
    Ok(())
}

pub async fn get(gateway: &FhirGateway, args: &GetArgs, format: OutputFormat) -> Result<()> {
    let mut query = FhirQuery::new(&args.resource_type);
    if let Some(id) = &args.id {
        query = query.with_id(id);
    }
    for (key, value) in parse_params(&args.params)? {
        query = query.with_param(key, value);
    }

    match gateway.fetch(&query).await.map_err(explain)? {
        ParsedResource::Resource(resource) => print_json(&resource),
        ParsedResource::Bundle(bundle) => print_resources(&bundle.into_resources(), format),
    }
    Ok(())
}

/// Splits `key=value` arguments. Values may themselves contain `=`.
pub fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|p| match p.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("Invalid search parameter \"{p}\". Expected key=value"),
        })
        .collect()
}

/// Adds a next step to errors the user can act on.
fn explain(err: GatewayError) -> anyhow::Error {
    if err.requires_reauthentication() {
        anyhow::Error::new(err).context("Reconnect required: run `ehrbridge login`")
    } else {
        anyhow::Error::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "patient=pat-42".to_string(),
            "code=http://loinc.org|1234-5".to_string(),
            "date=ge2024-01-01".to_string(),
            "_filter=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(params[0], ("patient".to_string(), "pat-42".to_string()));
        assert_eq!(params[1].1, "http://loinc.org|1234-5");
        assert_eq!(params[3], ("_filter".to_string(), "a=b".to_string()));
    }

    #[test]
    fn test_parse_params_rejects_bare_words() {
        assert!(parse_params(&["patient".to_string()]).is_err());
        assert!(parse_params(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_explain_reconnect() {
        let err = explain(GatewayError::NotAuthenticated);
        assert!(err.to_string().starts_with("Reconnect required"));
        assert!(err.downcast_ref::<GatewayError>().is_some());

        let err = explain(GatewayError::remote_api(500, "boom"));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
