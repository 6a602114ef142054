use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::lambda::{Function, Role};
use super::{get_att, PolicyStatement};
use crate::error::Result;
use crate::regions::{verify_region, CERTIFICATE_REGION};
use crate::stack::{CfnResource, Resource, StackInput};

/// Requests the certificate in `Region`, UPSERTs the ACM validation
/// records into `HostedZoneId` and waits for the certificate to be issued.
/// Any terminal status other than ISSUED, or running out of lambda time
/// while still pending, fails the resource. On delete the certificate is
/// removed, retrying while CloudFront still holds on to it.
pub const CERTIFICATE_HANDLER_SOURCE: &str = r#"const acm = require('@aws-sdk/client-acm');
const { Route53Client, ChangeResourceRecordSetsCommand } = require('@aws-sdk/client-route-53');
const response = require('cfn-response');
const sleep = (ms) => new Promise((r) => setTimeout(r, ms));
async function describe(client, CertificateArn) {
  const out = await client.send(new acm.DescribeCertificateCommand({ CertificateArn }));
  return out.Certificate;
}
function assertPending(cert, arn, context) {
  if (cert.Status !== 'PENDING_VALIDATION') throw new Error(`certificate ${arn} is ${cert.Status}`);
  if (context.getRemainingTimeInMillis() < 30000) throw new Error(`timed out validating ${arn}`);
}
async function issue(p, context) {
  const client = new acm.ACMClient({ region: p.Region });
  const { CertificateArn } = await client.send(new acm.RequestCertificateCommand({
    DomainName: p.DomainName,
    SubjectAlternativeNames: p.SubjectAlternativeNames,
    IdempotencyToken: p.IdempotencyToken,
    ValidationMethod: 'DNS',
  }));
  let options = [];
  while (!options.length || !options.every((o) => o.ResourceRecord)) {
    await sleep(5000);
    const cert = await describe(client, CertificateArn);
    if (cert.Status === 'ISSUED') return CertificateArn;
    assertPending(cert, CertificateArn, context);
    options = cert.DomainValidationOptions || [];
  }
  const records = new Map(options.map((o) => [o.ResourceRecord.Name, o.ResourceRecord]));
  const Changes = [...records.values()].map((rr) => ({
    Action: 'UPSERT',
    ResourceRecordSet: { Name: rr.Name, Type: rr.Type, TTL: 60, ResourceRecords: [{ Value: rr.Value }] },
  }));
  await new Route53Client({}).send(new ChangeResourceRecordSetsCommand({ HostedZoneId: p.HostedZoneId, ChangeBatch: { Changes } }));
  for (;;) {
    const cert = await describe(client, CertificateArn);
    if (cert.Status === 'ISSUED') return CertificateArn;
    assertPending(cert, CertificateArn, context);
    await sleep(10000);
  }
}
async function remove(p, arn, context) {
  if (!arn || !arn.startsWith('arn:')) return;
  const client = new acm.ACMClient({ region: p.Region });
  for (;;) {
    try {
      await client.send(new acm.DeleteCertificateCommand({ CertificateArn: arn }));
      return;
    } catch (err) {
      if (err.name === 'ResourceNotFoundException') return;
      if (err.name !== 'ResourceInUseException' || context.getRemainingTimeInMillis() < 60000) throw err;
      await sleep(30000);
    }
  }
}
exports.handler = async function (event, context) {
  const p = event.ResourceProperties;
  try {
    if (event.RequestType === 'Delete') {
      await remove(p, event.PhysicalResourceId, context);
      await response.send(event, context, response.SUCCESS, {}, event.PhysicalResourceId);
    } else {
      const arn = await issue(p, context);
      await response.send(event, context, response.SUCCESS, { Arn: arn }, arn);
    }
  } catch (err) {
    console.log(err);
    await response.send(event, context, response.FAILED, {}, event.PhysicalResourceId || context.logStreamName);
  }
};
"#;

/// the domain you're requesting a certificate for. Must be fully qualified. Can have 1 optional wildcard.
/// Examples of valid values:
/// - www.mysite.com
/// - multiple.sub.domains.mysite.com
/// - mysite.com
/// - *.mysite.com
/// Examples of invalid values:
/// - *.something.*.mysite.com
/// - cannotendwithdot.com.
pub fn verify_domain_name(domain_name: &str) -> std::result::Result<(), String> {
    if domain_name.is_empty() {
        return Err("Must provide a domain name".to_string());
    }
    if domain_name.len() > 253 {
        return Err(format!("{domain_name} is longer than 253 characters"));
    }
    if domain_name.contains('*') {
        if domain_name.matches('*').count() > 1 {
            return Err(format!("Must only provide 1 wildcard. {domain_name} is invalid."));
        }
        if !domain_name.starts_with("*.") {
            return Err(format!("If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {domain_name} is invalid."));
        }
    }
    if domain_name.ends_with('.') {
        return Err(format!("Domain names cannot end with a dot. {domain_name} is invalid."));
    }
    let labels: Vec<&str> = domain_name.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(format!("{domain_name} is not a fully qualified domain name."));
    }
    for (i, label) in labels.iter().enumerate() {
        if i == 0 && *label == "*" {
            continue;
        }
        verify_domain_label(label).map_err(|e| format!("{domain_name} is invalid. {e}"))?;
    }
    Ok(())
}

/// one dot separated component: lowercase letters, digits and inner dashes.
pub fn verify_domain_label(label: &str) -> std::result::Result<(), String> {
    if label.is_empty() || label.len() > 63 {
        return Err(format!("label {label:?} must be between 1 and 63 characters"));
    }
    if !label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(format!("label {label:?} may only contain lowercase letters, numbers, and dashes"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(format!("label {label:?} cannot start or end with a dash"));
    }
    Ok(())
}

/// ACM only accepts tokens of word characters, at most 32 long.
pub fn idempotency_token(domain_name: &str, subject_alternative_names: &[String], hosted_zone_id: &str) -> String {
    let mut data = domain_name.to_string();
    for san in subject_alternative_names {
        data.push('|');
        data.push_str(san);
    }
    data.push('|');
    data.push_str(hosted_zone_id);
    format!("{:08x}", adler::adler32_slice(data.as_bytes()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnsValidatedCertificate {
    #[serde(skip)]
    pub handler_logical_id: String,
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub hosted_zone_id: String,
    pub region: String,
    pub idempotency_token: String,
}

impl DnsValidatedCertificate {
    pub fn new(handler_logical_id: &str, domain_name: &str, subject_alternative_names: Vec<String>, hosted_zone_id: &str) -> Self {
        let idempotency_token = idempotency_token(domain_name, &subject_alternative_names, hosted_zone_id);
        Self {
            handler_logical_id: handler_logical_id.to_string(),
            domain_name: domain_name.to_string(),
            subject_alternative_names,
            hosted_zone_id: hosted_zone_id.to_string(),
            region: CERTIFICATE_REGION.to_string(),
            idempotency_token,
        }
    }

    /// the apex domain followed by every alternative name.
    pub fn domain_set(&self) -> Vec<&str> {
        std::iter::once(self.domain_name.as_str())
            .chain(self.subject_alternative_names.iter().map(|s| s.as_str()))
            .collect()
    }
}

impl CfnResource for DnsValidatedCertificate {
    fn type_string(&self) -> &'static str {
        "Custom::DnsValidatedCertificate"
    }
    fn properties(&self) -> Result<Value> {
        let mut props = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut props {
            map.insert("ServiceToken".to_string(), get_att(&self.handler_logical_id, "Arn"));
        }
        Ok(props)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        for domain in self.domain_set() {
            verify_domain_name(domain)?;
        }
        if self.hosted_zone_id.is_empty() {
            return Err("Must provide the hosted zone ID of where your domain resides".to_string());
        }
        if let Some(e) = verify_region(&self.region) {
            return Err(e);
        }
        if self.region != CERTIFICATE_REGION {
            return Err(format!("certificates used by CloudFront must be issued in {CERTIFICATE_REGION}, not {}", self.region));
        }
        Ok(())
    }
}

/// Adds the certificate custom resource and its handler. Returns the
/// logical id of the certificate; its `Arn` attribute is the certificate ARN.
pub fn add_dns_validated_certificate(
    logical_cert_name: &str,
    domain_name: &str,
    subject_alternative_names: Vec<String>,
    hosted_zone_id: &str,
    stackinp: &mut StackInput,
) -> String {
    let logical_role_name = format!("{logical_cert_name}HandlerRole");
    let logical_fn_name = format!("{logical_cert_name}Handler");

    let role = Role::for_lambda(
        &format!("requests and validates {logical_cert_name}"),
        "dns-validated-certificate",
        &[
            PolicyStatement::allow(
                &["acm:RequestCertificate", "acm:DescribeCertificate", "acm:DeleteCertificate"],
                vec![Value::String("*".to_string())],
            ),
            PolicyStatement::allow(&["route53:GetChange"], vec![Value::String("*".to_string())]),
            PolicyStatement::allow(
                &["route53:ChangeResourceRecordSets"],
                vec![serde_json::json!({ "Fn::Sub": format!("arn:${{AWS::Partition}}:route53:::hostedzone/{hosted_zone_id}") })],
            ),
        ],
    );
    let function = Function::inline_node(
        &format!("issues {domain_name} in {CERTIFICATE_REGION} with DNS validation"),
        CERTIFICATE_HANDLER_SOURCE,
        &logical_role_name,
        900,
    );
    let cert = DnsValidatedCertificate::new(&logical_fn_name, domain_name, subject_alternative_names, hosted_zone_id);
    debug!(domains = ?cert.domain_set(), zone = hosted_zone_id, "added dns validated certificate");

    stackinp.push(Resource::new(&logical_role_name, role));
    stackinp.push(Resource::new(&logical_fn_name, function));
    stackinp.push(Resource::new(logical_cert_name, cert));
    logical_cert_name.to_string()
}
