//! Lector mínimo de archivos INI de corrida.
//!
//! Formato aceptado: secciones `[Nombre]`, pares `clave = valor`, comentarios
//! con `;` o `#` en línea completa, o al final del valor si van precedidos
//! de un espacio (`clave = a#b` conserva `a#b`). Secciones y claves se
//! comparan sin distinguir mayúsculas.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct IniDocument {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = IniDocument::default();
        let mut current = String::new();
        for raw in text.lines() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.trim().to_ascii_lowercase();
                doc.sections.entry(current.clone()).or_default();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                doc.sections
                   .entry(current.clone())
                   .or_default()
                   .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
        doc
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_lowercase())
            .and_then(|s| s.get(&key.to_ascii_lowercase()))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with([';', '#']) {
        return "";
    }
    let mut prev_ws = false;
    for (idx, ch) in line.char_indices() {
        if prev_ws && (ch == ';' || ch == '#') {
            return &line[..idx];
        }
        prev_ws = ch.is_whitespace();
    }
    line
}
