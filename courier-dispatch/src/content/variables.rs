//! `{variable}` placeholders in subjects and bodies.

use chrono::NaiveDateTime;

use super::Contact;

/// Every placeholder name [`substitute_variables`] understands.
pub const VARIABLES: [&str; 13] = [
    "nome",
    "email",
    "telefone",
    "razao_social",
    "cliente",
    "empresa",
    "endereco",
    "cargo",
    "produto",
    "valor",
    "vencimento",
    "data",
    "hora",
];

fn first_set<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|value| value.as_deref())
        .find(|value| !value.is_empty())
}

/// Value for `name` (already lowercased), or `None` if it is not a known
/// placeholder. Known placeholders with no data resolve to an empty string.
fn resolve(name: &str, contact: &Contact, now: NaiveDateTime) -> Option<String> {
    let value = match name {
        "nome" => first_set(&[&contact.nome]),
        "email" => first_set(&[&contact.email]),
        "telefone" => first_set(&[&contact.telefone]),
        "razao_social" => first_set(&[&contact.razao_social, &contact.fantasy_name]),
        "cliente" => first_set(&[&contact.cliente, &contact.nome]),
        "empresa" => Some(
            first_set(&[&contact.razao_social, &contact.fantasy_name, &contact.empresa])
                .unwrap_or("Empresa"),
        ),
        "endereco" => first_set(&[&contact.endereco]),
        "cargo" => first_set(&[&contact.cargo]),
        "produto" => first_set(&[&contact.produto]),
        "valor" => first_set(&[&contact.valor]),
        "vencimento" => first_set(&[&contact.vencimento]),
        "data" => return Some(now.format("%d/%m/%Y").to_string()),
        "hora" => return Some(now.format("%H:%M:%S").to_string()),
        _ => return None,
    };

    Some(value.unwrap_or_default().to_string())
}

/// Replace every known `{variable}` in `text`, ignoring case.
///
/// Unknown placeholders and stray braces are left as they are.
///
/// ```
/// use chrono::NaiveDate;
/// use courier_dispatch::content::{Contact, substitute_variables};
///
/// let contact = Contact {
///     nome: Some("Ana".to_string()),
///     ..Contact::default()
/// };
/// let now = NaiveDate::from_ymd_opt(2024, 3, 5)
///     .and_then(|d| d.and_hms_opt(9, 7, 0))
///     .unwrap_or_default();
///
/// assert_eq!(
///     substitute_variables("Olá {NOME}, hoje é {data} ({desconhecido})", &contact, now),
///     "Olá Ana, hoje é 05/03/2024 ({desconhecido})"
/// );
/// ```
#[must_use]
pub fn substitute_variables(text: &str, contact: &Contact, now: NaiveDateTime) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            if name.contains('{') {
                return None;
            }
            resolve(&name.to_lowercase(), contact, now).map(|value| (value, close))
        });

        match replaced {
            Some((value, close)) => {
                output.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Placeholder-shaped tokens in `text` that are not in [`VARIABLES`],
/// in order of first appearance.
#[must_use]
pub fn unknown_variables(text: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };

        let name = &after[..close];
        let is_token = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_');
        if is_token
            && !VARIABLES.contains(&name.to_lowercase().as_str())
            && !unknown.iter().any(|seen| seen == name)
        {
            unknown.push(name.to_string());
        }

        rest = &after[close + 1..];
    }

    unknown
}
