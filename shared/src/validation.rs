//! Validation utilities for the SupplyMate platform
//!
//! Includes Indonesia-specific checks for partner contact details.

use rust_decimal::Decimal;

use crate::models::Unit;
use crate::types::QUANTITY_SCALE;

// ============================================================================
// Catalog Validations
// ============================================================================

/// Maximum length of a scan code (EAN-13, UPC-A, Code 128 and QR payloads used in practice)
pub const MAX_SCAN_CODE_LEN: usize = 64;

/// Normalize a scanned or typed code: surrounding whitespace is dropped.
pub fn normalize_scan_code(code: &str) -> String {
    code.trim().to_string()
}

/// Validate a product scan code after normalization
pub fn validate_scan_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() {
        return Err("Scan code is required");
    }
    if code.len() > MAX_SCAN_CODE_LEN {
        return Err("Scan code must be at most 64 characters");
    }
    if code.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err("Scan code must not contain whitespace or control characters");
    }
    Ok(())
}

/// Validate that a buy or sell price is a non-negative amount with at most two decimals
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    if price.normalize().scale() > 2 {
        return Err("Price can have at most two decimal places");
    }
    Ok(())
}

/// Validate an order line quantity for a product stocked in `unit`
pub fn validate_order_quantity(quantity: Decimal, unit: Unit) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    if !unit.accepts(quantity) {
        return Err("Quantity must be a whole number for this unit");
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity can have at most three decimal places");
    }
    Ok(())
}

/// Validate a stock input amount; negative amounts are corrections
pub fn validate_input_amount(amount: Decimal, unit: Unit) -> Result<(), &'static str> {
    if amount.is_zero() {
        return Err("Amount must not be zero");
    }
    if !unit.accepts(amount) {
        return Err("Amount must be a whole number for this unit");
    }
    if amount.normalize().scale() > QUANTITY_SCALE {
        return Err("Amount can have at most three decimal places");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required");
    }
    if trimmed.chars().count() > 120 {
        return Err("Name must be at most 120 characters");
    }
    Ok(())
}

// ============================================================================
// Indonesia-Specific Validations
// ============================================================================

/// Validate Indonesian phone number format
/// Accepts: 081234567890, 0812-3456-7890, +6281234567890
pub fn validate_indonesian_phone(phone: &str) -> Result<(), &'static str> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    // Domestic: leading 0, 10-13 digits (e.g., 081234567890)
    if digits.starts_with('0') && (10..=13).contains(&digits.len()) {
        return Ok(());
    }
    // International with country code 62, 11-14 digits
    if digits.starts_with("62") && (11..=14).contains(&digits.len()) {
        return Ok(());
    }

    Err("Invalid Indonesian phone number format")
}
