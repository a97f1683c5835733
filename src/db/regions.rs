//! Philippine administrative regions and the provinces (or NCR cities)
//! bulletins name inside them.

const REGION_PROVINCES: &[(&str, &[&str])] = &[
    ("Region I (Ilocos Region)", &["Ilocos Norte", "Ilocos Sur", "La Union", "Pangasinan"]),
    ("Region II (Cagayan Valley)", &["Batanes", "Cagayan", "Isabela", "Nueva Vizcaya", "Quirino"]),
    (
        "Region III (Central Luzon)",
        &["Aurora", "Bataan", "Bulacan", "Nueva Ecija", "Pampanga", "Tarlac", "Zambales"],
    ),
    ("Region IV-A (CALABARZON)", &["Batangas", "Cavite", "Laguna", "Quezon", "Rizal"]),
    (
        "Region IV-B (MIMAROPA)",
        &["Marinduque", "Occidental Mindoro", "Oriental Mindoro", "Palawan", "Romblon"],
    ),
    (
        "Region V (Bicol)",
        &["Albay", "Camarines Norte", "Camarines Sur", "Catanduanes", "Masbate", "Sorsogon"],
    ),
    (
        "Region VI (Western Visayas)",
        &["Aklan", "Antique", "Capiz", "Guimaras", "Iloilo", "Negros Occidental"],
    ),
    ("Region VII (Central Visayas)", &["Bohol", "Cebu", "Negros Oriental", "Siquijor"]),
    (
        "Region VIII (Eastern Visayas)",
        &["Biliran", "Eastern Samar", "Leyte", "Northern Samar", "Samar", "Southern Leyte"],
    ),
    (
        "Region IX (Zamboanga Peninsula)",
        &["Zamboanga del Norte", "Zamboanga del Sur", "Zamboanga Sibugay"],
    ),
    (
        "Region X (Northern Mindanao)",
        &["Bukidnon", "Camiguin", "Lanao del Norte", "Misamis Occidental", "Misamis Oriental"],
    ),
    (
        "Region XI (Davao)",
        &["Davao de Oro", "Davao del Norte", "Davao del Sur", "Davao Occidental", "Davao Oriental"],
    ),
    ("Region XII (SOCCSKSARGEN)", &["Cotabato", "Sarangani", "South Cotabato", "Sultan Kudarat"]),
    (
        "Region XIII (Caraga)",
        &["Agusan del Norte", "Agusan del Sur", "Dinagat Islands", "Surigao del Norte", "Surigao del Sur"],
    ),
    ("CAR (Cordillera)", &["Abra", "Apayao", "Benguet", "Ifugao", "Kalinga", "Mountain Province"]),
    (
        "BARMM",
        &["Basilan", "Lanao del Sur", "Maguindanao del Norte", "Maguindanao del Sur", "Sulu", "Tawi-Tawi"],
    ),
    (
        "NCR (Metro Manila)",
        &[
            "Manila", "Caloocan", "Las Piñas", "Makati", "Malabon", "Mandaluyong", "Marikina",
            "Muntinlupa", "Navotas", "Parañaque", "Pasay", "Pasig", "Pateros", "Quezon City",
            "San Juan", "Taguig", "Valenzuela",
        ],
    ),
];

const SHORT_NAMES: &[(&str, &str)] = &[
    ("NCR", "NCR (Metro Manila)"),
    ("CAR", "CAR (Cordillera)"),
    ("Region I", "Region I (Ilocos Region)"),
    ("Region II", "Region II (Cagayan Valley)"),
    ("Region III", "Region III (Central Luzon)"),
    ("Region IV-A", "Region IV-A (CALABARZON)"),
    ("Region IV-B", "Region IV-B (MIMAROPA)"),
    ("Region V", "Region V (Bicol)"),
    ("Region VI", "Region VI (Western Visayas)"),
    ("Region VII", "Region VII (Central Visayas)"),
    ("Region VIII", "Region VIII (Eastern Visayas)"),
    ("Region IX", "Region IX (Zamboanga Peninsula)"),
    ("Region X", "Region X (Northern Mindanao)"),
    ("Region XI", "Region XI (Davao)"),
    ("Region XII", "Region XII (SOCCSKSARGEN)"),
    ("Region XIII", "Region XIII (Caraga)"),
    ("BARMM", "BARMM"),
];

/// Short code to canonical region name; unknown names pass through.
pub fn canonical_region(name: &str) -> &str {
    SHORT_NAMES
        .iter()
        .find(|(short, _)| *short == name)
        .map(|(_, full)| *full)
        .unwrap_or(name)
}

/// Provinces in a region, by short code or canonical name. Empty when unknown.
pub fn provinces_for(region: &str) -> &'static [&'static str] {
    let full = canonical_region(region);
    REGION_PROVINCES
        .iter()
        .find(|(name, _)| *name == full)
        .map(|(_, provinces)| *provinces)
        .unwrap_or(&[])
}
