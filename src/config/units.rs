use std::collections::BTreeMap;

/// 检验项目的默认单位表：报告里没有打印单位时使用。
///
/// `None` 表示该项目明确没有默认单位（比值类），匹配不到单位时输出 "N/A"。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultUnitTable {
    units: BTreeMap<String, Option<String>>,
}

impl DefaultUnitTable {
    pub fn new(units: BTreeMap<String, Option<String>>) -> Self {
        Self { units }
    }

    /// 内置的血常规 / 生化常用项目
    pub fn builtin() -> Self {
        let entries: [(&str, Option<&str>); 21] = [
            ("Hemoglobin", Some("gm%")),
            ("Total WBC Count", Some("Cells/cumm")),
            ("RBC Count", Some("Millions/cumm")),
            ("RDW", Some("%")),
            ("HCT", Some("%")),
            ("MCV", Some("fL")),
            ("MCH", Some("pg")),
            ("MCHC", Some("g/dL")),
            ("MPV", Some("fL")),
            ("Lymphocytes", Some("%")),
            ("Neutrophils", Some("%")),
            ("Basophils", Some("%")),
            ("Eosinophils", Some("%")),
            ("Monocytes", Some("%")),
            ("Platelet Count", Some("Laks/cumm")),
            ("Vitamin D 25 - Hydroxy", Some("ng/mL")),
            ("Vitamin B12", Some("pg/mL")),
            ("Fasting Plasma Glucose", Some("mg/dL")),
            ("Total Cholesterol", Some("mg/dL")),
            ("Cholesterol / HDL Ratio", None),
            ("Plasma Glucose", Some("mg/dL")),
        ];

        Self::new(
            entries
                .iter()
                .map(|(name, unit)| (name.to_string(), unit.map(str::to_string)))
                .collect(),
        )
    }

    /// 按规范名查找默认单位；未登记或登记为无单位都返回 None
    pub fn lookup(&self, test_name: &str) -> Option<&str> {
        self.units.get(test_name).and_then(|unit| unit.as_deref())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}

impl Default for DefaultUnitTable {
    fn default() -> Self {
        Self::builtin()
    }
}
