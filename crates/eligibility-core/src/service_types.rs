//! X12 service-type code dictionary.

use lazy_static::lazy_static;
use std::collections::BTreeMap;

lazy_static! {
    static ref SERVICE_TYPES: BTreeMap<&'static str, &'static str> = [
        ("1", "Medical Care"),
        ("2", "Surgical"),
        ("3", "Consultation"),
        ("4", "Diagnostic X-Ray"),
        ("5", "Diagnostic Lab"),
        ("6", "Radiation Therapy"),
        ("7", "Anesthesia"),
        ("8", "Surgical Assistance"),
        ("12", "Durable Medical Equipment Purchase"),
        ("14", "Renal Supplies in the Home"),
        ("18", "Durable Medical Equipment Rental"),
        ("20", "Second Surgical Opinion"),
        ("23", "Diagnostic Dental"),
        ("24", "Periodontics"),
        ("25", "Restorative"),
        ("26", "Endodontics"),
        ("27", "Maxillofacial Prosthetics"),
        ("28", "Adjunctive Dental Services"),
        ("30", "Health Benefit Plan Coverage"),
        ("33", "Chiropractic"),
        ("35", "Dental Care"),
        ("36", "Dental Crowns"),
        ("37", "Dental Accident"),
        ("38", "Orthodontics"),
        ("39", "Prosthodontics"),
        ("40", "Oral Surgery"),
        ("41", "Routine (Preventive) Dental"),
        ("42", "Home Health Care"),
        ("45", "Hospice"),
        ("47", "Hospital"),
        ("48", "Hospital - Inpatient"),
        ("50", "Hospital - Outpatient"),
        ("51", "Hospital - Emergency Accident"),
        ("52", "Hospital - Emergency Medical"),
        ("53", "Hospital - Ambulatory Surgical"),
        ("54", "Long Term Care"),
        ("56", "Medically Related Transportation"),
        ("61", "In-vitro Fertilization"),
        ("62", "MRI/CAT Scan"),
        ("65", "Newborn Care"),
        ("68", "Well Baby Care"),
        ("69", "Maternity"),
        ("73", "Diagnostic Medical"),
        ("76", "Dialysis"),
        ("78", "Chemotherapy"),
        ("80", "Immunizations"),
        ("81", "Routine Physical"),
        ("82", "Family Planning"),
        ("86", "Emergency Services"),
        ("88", "Pharmacy"),
        ("93", "Podiatry"),
        ("98", "Professional (Physician) Visit - Office"),
        ("99", "Professional (Physician) Visit - Inpatient"),
        ("A0", "Professional (Physician) Visit - Outpatient"),
        ("A3", "Professional (Physician) Visit - Home"),
        ("A4", "Psychiatric"),
        ("A6", "Psychotherapy"),
        ("A7", "Psychiatric - Inpatient"),
        ("A8", "Psychiatric - Outpatient"),
        ("AD", "Occupational Therapy"),
        ("AE", "Physical Medicine"),
        ("AF", "Speech Therapy"),
        ("AG", "Skilled Nursing Care"),
        ("AJ", "Alcoholism"),
        ("AK", "Drug Addiction"),
        ("AL", "Vision (Optometry)"),
        ("BG", "Cardiac Rehabilitation"),
        ("BH", "Pediatric"),
        ("MH", "Mental Health"),
        ("UC", "Urgent Care"),
    ]
    .into_iter()
    .collect();
}

/// Whether `code` is a supported service-type code.
///
/// Codes are matched exactly; callers normalize case first.
pub fn is_known(code: &str) -> bool {
    SERVICE_TYPES.contains_key(code)
}

/// Display name for a code.
pub fn describe(code: &str) -> Option<&'static str> {
    SERVICE_TYPES.get(code).copied()
}

/// All supported codes with their names, ordered by code.
pub fn all() -> impl Iterator<Item = (&'static str, &'static str)> {
    SERVICE_TYPES.iter().map(|(code, name)| (*code, *name))
}
