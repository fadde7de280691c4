use super::CropGeometry;

// Deserialization goes through `CropGeometry::new`, so a zero window or
// stride is rejected when the configuration is loaded.
impl<'de> serde::Deserialize<'de> for CropGeometry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        const FIELDS: &[&str] = &["window", "stride"];
        enum Field {
            Window,
            Stride,
        }

        impl<'de> serde::Deserialize<'de> for Field {
            fn deserialize<D>(deserializer: D) -> Result<Field, D::Error>
            where
                D: serde::de::Deserializer<'de>,
            {
                struct FieldVisitor;

                impl<'de> serde::de::Visitor<'de> for FieldVisitor {
                    type Value = Field;

                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        formatter.write_str("`window` or `stride`")
                    }

                    fn visit_str<E>(self, value: &str) -> Result<Field, E>
                    where
                        E: serde::de::Error,
                    {
                        match value {
                            "window" => Ok(Field::Window),
                            "stride" => Ok(Field::Stride),
                            _ => Err(serde::de::Error::unknown_field(value, FIELDS)),
                        }
                    }
                }

                deserializer.deserialize_identifier(FieldVisitor)
            }
        }

        struct GeometryVisitor;

        impl<'de> serde::de::Visitor<'de> for GeometryVisitor {
            type Value = CropGeometry;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("struct CropGeometry")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<CropGeometry, V::Error>
            where
                V: serde::de::SeqAccess<'de>,
            {
                let window = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let stride = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                CropGeometry::new(window, stride).map_err(serde::de::Error::custom)
            }

            fn visit_map<V>(self, mut map: V) -> Result<CropGeometry, V::Error>
            where
                V: serde::de::MapAccess<'de>,
            {
                let mut window = None;
                let mut stride = None;
                while let Some(key) = map.next_key()? {
                    match key {
                        Field::Window => {
                            if window.is_some() {
                                return Err(serde::de::Error::duplicate_field("window"));
                            }
                            window = Some(map.next_value()?);
                        }
                        Field::Stride => {
                            if stride.is_some() {
                                return Err(serde::de::Error::duplicate_field("stride"));
                            }
                            stride = Some(map.next_value()?);
                        }
                    }
                }
                let window = window.ok_or_else(|| serde::de::Error::missing_field("window"))?;
                // stride defaults to 1, one crop per sample offset
                let stride = stride.unwrap_or(1);
                CropGeometry::new(window, stride).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_struct("CropGeometry", FIELDS, GeometryVisitor)
    }
}
