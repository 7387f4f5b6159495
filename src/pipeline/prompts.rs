//! System instructions for the structuring call, one per template family.

use crate::region::TemplateFamily;

macro_rules! core_rules {
    () => {
        r#"You are an information extraction engine.
Extract structured JSON from hospital billing and medical insurance documents.
Accuracy and data integrity are critical.

CORE RULES
1. No calculations. Copy totals only when printed; a missing value is null. Never fabricate values.
2. Zero is valid only when printed. Never replace a missing value with 0.
3. Keep prices exactly as written (strings). Do not round, normalize, or add derived fields.
4. Do not translate. Arabic stays Arabic; English fields are filled only from English text.

DOCUMENTS
- invoice_number is the document key. If it already exists, reuse that document and append sections; never create a second header.
- file_number is taken from its first occurrence only.
- Once created, a document header is read-only.
- A document continues across pages until a new invoice_number appears. Do not stop early when totals appear.

SECTIONS AND TABLES
- Sections with the same section_name may repeat; each physical table is one section object.
- Extract every row that has a service description, code, date or time, or any price field. Do not skip tables with unfamiliar columns.
- Copy section subtotals only when printed. A last row without a code is the subtotal row; otherwise section_subtotal is null.

HEADER AND IDENTITY
- Extract header fields only when present; invoice_number and file_number must not be empty.
- Do not infer doctor names, specialties, room types or identity fields.
- patient_identity comes only from the "ID Card" section; id_card_number has the form ACA-xxxx-xxxxx-xxx.

FOOTER
- Never write 0 or 0.00 unless printed. Without a grand total, net_total_amount and amount_due are null.
- Only allowed calculation: with no grand total but several explicitly labeled section totals, net_total_amount is their sum.
"#
    };
}

macro_rules! output_schema {
    () => {
        r#"
OUTPUT
Output only valid JSON with no explanations, comments or extra text:
{
  "documents": [
    {
      "header": {
        "invoice_number": "String", "file_number": "String", "patient_name": "String",
        "date": "ISO String or null", "admission_date": "ISO String or null",
        "discharge_date": "ISO String or null", "company_name": "String or null",
        "doctor_name_en": "String or null", "doctor_name_ar": "String or null",
        "specialty": "String or null", "insurer_name": "String or null",
        "ward": "String or null", "room_type": "String or null"
      },
      "patient_identity": {
        "id_employee_name": "String or null", "id_card_number": "String or null",
        "id_date_of_birth": "ISO String or null",
        "id_validity_period": "ISO String-ISO String or null"
      },
      "sections": [
        {
          "section_name": "String or null",
          "section_subtotal": "String or null",
          "items": [
            {
              "service_description_en": "String or null",
              "service_description_ar": "String or null",
              "code": "String or null", "date": "String", "time": "String or null",
              "unit_price": "String or null", "company_price": "String or null",
              "patient_price": "String or null", "net_price": "Number or null",
              "quantity": "String or null", "amount": "Number or null"
            }
          ]
        }
      ],
      "footer": {
        "net_total_amount": "Number or null", "paid": "String or null",
        "amount_due": "Number or null"
      }
    }
  ]
}"#
    };
}

pub const JANZOUR_STRUCTURE_PROMPT: &str = concat!(
    core_rules!(),
    r#"
FOOTER SUMMARY TABLE
A table with exactly 5 columns headed القيمة, الجهة, المريض, الإجمالي, الخدمة الطبية, numeric rows,
an empty الخدمة الطبية column and no service code is a footer summary, never a section.
Use it only for the footer: net_total_amount from الإجمالي, paid from الجهة, amount_due from المريض.
With several rows use the last row where any value is not 0.00.

NEVER SECTIONS
فاتورة إيواء, حالة مستشفى and كشف تفاصيل الخدمات are document titles.
"#,
    output_schema!()
);

pub const MASSARA_STRUCTURE_PROMPT: &str = concat!(
    core_rules!(),
    r#"
SECTION IDENTITY
A row with a single data cell (<td>) is a section name. One table may hold several sections.
Column names may be wrong; read the cell contents to decide what each column holds.
In tables with these columns: دينار is amount, القيمة is code, الكود is service_name_en,
الخدمة is service_name_ar with date and time.

FOOTER TOTALS
Totals usually follow the table, for example:
**الاجمالي:** 25,985.000 دينار -> net_total_amount
**المدفوع:** 985.000 دينار -> paid
**قيمة التعطية:** 25,000.000 دينار -> amount_due
The same labels may appear in English when Arabic is absent.

NEVER SECTIONS
فاتورة إيواء is a document title.
"#,
    output_schema!()
);

pub fn structure_prompt(family: TemplateFamily) -> &'static str {
    match family {
        TemplateFamily::JanzourSafwa => JANZOUR_STRUCTURE_PROMPT,
        TemplateFamily::MassaraMuasafat => MASSARA_STRUCTURE_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_share_rules_and_schema() {
        for family in [TemplateFamily::JanzourSafwa, TemplateFamily::MassaraMuasafat] {
            let prompt = structure_prompt(family);
            assert!(prompt.starts_with("You are an information extraction engine."));
            assert!(prompt.contains("\"documents\""));
        }
        assert!(JANZOUR_STRUCTURE_PROMPT.contains("FOOTER SUMMARY TABLE"));
        assert!(MASSARA_STRUCTURE_PROMPT.contains("SECTION IDENTITY"));
    }
}
