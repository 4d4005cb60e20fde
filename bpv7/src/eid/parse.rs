use super::*;

pub(super) fn eid_from_str(s: &str) -> Result<Eid, EidError> {
    if let Some(ssp) = s.strip_prefix("dtn:") {
        dtn_from_ssp(ssp)
    } else if let Some(ssp) = s.strip_prefix("ipn:") {
        ipn_from_ssp(ssp)
    } else if let Some((scheme, _)) = s.split_once(':') {
        Err(EidError::UnsupportedScheme(scheme.to_string()))
    } else {
        Err(EidError::MissingScheme(s.to_string()))
    }
}

fn dtn_from_ssp(ssp: &str) -> Result<Eid, EidError> {
    if ssp == "none" {
        return Ok(Eid::Null);
    }
    let (node_name, demux) = match ssp.split_once('/') {
        Some((node_name, demux)) => (node_name, demux),
        None => (ssp, ""),
    };
    if node_name.is_empty() || node_name == "none" {
        return Err(EidError::InvalidDtnSsp(ssp.to_string()));
    }
    Ok(Eid::Dtn {
        node_name: node_name.to_string(),
        demux: demux.to_string(),
    })
}

fn ipn_from_ssp(ssp: &str) -> Result<Eid, EidError> {
    let Some((node, service)) = ssp.split_once('.') else {
        return Err(EidError::InvalidIpnSsp(ssp.to_string()));
    };
    let (Ok(node_number), Ok(service_number)) = (node.parse(), service.parse()) else {
        return Err(EidError::InvalidIpnSsp(ssp.to_string()));
    };
    Ok(Eid::Ipn {
        node_number,
        service_number,
    })
}

pub(super) fn eid_from_cbor(data: &[u8]) -> Result<(Eid, usize), EidError> {
    cbor::decode::parse_array(data, |a, _| {
        let scheme = a.parse::<u64>().map_err(|e| EidError::InvalidField {
            field: "EID scheme code",
            source: e.into(),
        })?;
        let eid = match scheme {
            1 => a.parse_value(|value, _| match value {
                cbor::decode::Value::UnsignedInteger(0) => Ok(Eid::Null),
                cbor::decode::Value::Text(s) => dtn_from_ssp(s),
                value => Err(EidError::InvalidCbor(
                    cbor::decode::Error::IncorrectType(
                        "Text String or 0".to_string(),
                        value.type_name(false),
                    ),
                )),
            })?.0,
            2 => {
                a.parse_array(|a, _| {
                    let node_number =
                        a.parse::<u64>().map_err(|e| EidError::InvalidField {
                            field: "ipn node number",
                            source: e.into(),
                        })?;
                    let service_number =
                        a.parse::<u64>().map_err(|e| EidError::InvalidField {
                            field: "ipn service number",
                            source: e.into(),
                        })?;
                    Ok::<_, EidError>(Eid::Ipn {
                        node_number,
                        service_number,
                    })
                })?
                .0
            }
            code => return Err(EidError::UnsupportedSchemeCode(code)),
        };
        Ok(eid)
    })
}
