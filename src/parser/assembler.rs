use super::{ExtractionRecord, PatientDetails, ResultEntry};

/// 合并患者信息和各页结果：按页顺序拼接，不校验、不去重、不排序
pub fn assemble(patient: PatientDetails, per_page_results: Vec<Vec<ResultEntry>>) -> ExtractionRecord {
    ExtractionRecord {
        patient_details: vec![patient],
        test_results: per_page_results.into_iter().flatten().collect(),
    }
}
