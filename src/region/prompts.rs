//! Page transcription prompts, one per page mode.

/// Short probe used to read a title crop before choosing a mode.
pub const TITLE_PROBE_PROMPT: &str = "extract the arabic text";

pub const JANZOUR_PAGE_PROMPT: &str = "Extract all text from the document. Transcribe Arabic labels exactly and provide values accurately.

STRICT FORMATTING RULES:
1. Ignore watermarks, QR codes, and logos.
2. DATE CONVERSION: The document uses DD/MM/YY and YYYY-MM-DD formats. Convert ALL dates to the DD/MM/YYYY standard. Crucially, ensure the year is always 4 digits (e.g., 2025, not 25).
3. TABLE EXTRACTION: Extract data from each table (Cash, Stay, Supervision, Analysis) row by row.
4. COLUMN MAPPING: When transcribing data rows, map the Arabic column names (الجهة, المريض, صافي السعر, إلخ) to their corresponding values precisely, even if the value is zero or an empty cell.
5. GENERAL DETAILS: For the header section (التاريخ, المريض, الجهة, الإقامة), extract all text pairs verbatim.

Note: For fields with dates like 'الإقامة: من 24/04/2025 18:48 إلى 26/04/2025 12:32', extract them exactly as they appear without reordering the dates within the range.
*FINAL OUTPUT INSTRUCTION:*
Present the extracted data (General Details and all table data) structured *ENTIRELY in HTML format*. Only return HTML table within <table></table>. Ignore images, Stamps, Seals";

/// Used for both structured Massara/Muasafat crops and medicine pages.
pub const MASSARA_PAGE_PROMPT: &str = "### ROLE
Precision Medical Data Extractor.

### RULES
1. NUMBERS: Use Western/English digits only (e.g., 10,762.500).
2. NO ROWSPAN: Never use the 'rowspan' attribute. Every single line in the image must be its own <tr>.
3. COLUMN STRUCTURE: The table MUST have exactly 4 columns: [دينار | القيمة | الكود | الخدمة].
4. COLSPAN: Only use 'colspan=\"3\"' for the 'الخدمة' column when it is a section header or contains the full service description.
5. DATA INTEGRITY:
    - Capture the Date (DD.MM.YYYY) and Time (HH:MM) and keep them inside the 'الخدمة' (Service) cell.
    - If a row is a section header (e.g., \"عمليات جراحية\"), include it as a <tr> with the text in the 'الخدمة' cell and leave 'الكود' and 'القيمة' empty.
    - Do not repeat text from previous rows into new rows.

### TABLE MAPPING
- Column 1 (Rightmost in image, Leftmost in HTML): Currency (دينار)
- Column 2: Value (القيمة)
- Column 3: Code (الكود)
- Column 4 (Leftmost in image, Rightmost in HTML): Service Description (الخدمة) - This cell must contain English Name + Date/Time + Arabic Name.

### OUTPUT
- Return ONLY the HTML table.
- Use <br> to separate lines within a single <td>.";

pub const IDCARD_PAGE_PROMPT: &str = "STRICT FORMATTING RULES:
1. IGNORE ARTIFACTS: Ignore watermarks, QR codes, and logos.

2. DATE CONVERSION:
   - The document uses YYYY-MM-DD format (e.g., 2026-02-16).
   - You must convert ALL dates to DD-MM-YYYY format.
   - VALIDITY LINE: The validity line contains two dates (Start and End). Treat them as separate values. Do not merge them.
     Input: \"2026-02-16 - 2025-02-17\" -> Output: \"16-02-2026 - 17-02-2025\"

3. ID NUMBER (CRITICAL):
   - The field labeled \"رقم البطاقة\" contains Latin/English characters.
   - READING DIRECTION: You MUST read this specific value LEFT-TO-RIGHT, even though the rest of the document is Right-to-Left.
   - STRUCTURE ENFORCEMENT: The ID strictly follows this pattern: [3 Letters]-[4 Digits]-[5 Digits]-[3 Characters].
   - ZERO PRESERVATION: Ensure you capture all zeros in the middle sequence. Look closely for '00080', not '0080'.
   - Example format: ACA-xxxx-xxxxx-xxx.
   - If the text appears as \"P02-ACA...\", you are reading it backwards. Reverse it to start with \"ACA\".

4. ARABIC ACCURACY:
   - Ensure the label \"اسم المستفيد\" is read correctly (do not confuse with \"المستلم\").
   - Read the names carefully.

Read the document naturally, but apply these formatting constraints strictly.";

/// Marker pair a Janzour receipt title must contain.
pub const RECEIPT_MARKERS: [&str; 2] = ["إيصال", "رقم"];

/// Massara titles whose pages are dropped.
pub const EXCLUDED_TITLE_MARKERS: [&str; 3] = [
    "أدوية ومستلزمات من الايواء",
    "ورقة خروج",
    "Discharge Paper",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_prompts_ask_for_html() {
        assert!(JANZOUR_PAGE_PROMPT.contains("ENTIRELY in HTML format"));
        assert!(!JANZOUR_PAGE_PROMPT.contains("JSON"));
        assert!(MASSARA_PAGE_PROMPT.contains("[دينار | القيمة | الكود | الخدمة]"));
        assert!(MASSARA_PAGE_PROMPT.contains("Never use the 'rowspan' attribute"));
    }

    #[test]
    fn test_idcard_prompt_pins_number_format() {
        assert!(IDCARD_PAGE_PROMPT.contains("LEFT-TO-RIGHT"));
        assert!(IDCARD_PAGE_PROMPT.contains("ACA-xxxx-xxxxx-xxx"));
        assert!(IDCARD_PAGE_PROMPT.contains("'00080', not '0080'"));
    }
}
