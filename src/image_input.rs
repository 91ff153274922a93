use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;

use crate::error::DescribeError;

/// base64 -> 原始字节；解码后超过 `max_bytes` 直接拒绝
pub fn decode_base64(payload: &str, max_bytes: usize) -> Result<Vec<u8>, DescribeError> {
    // MIME 风格的 base64 每 76 个字符换行，先去掉所有空白
    let payload: Cow<'_, str> = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(payload.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(payload)
    };

    // 解码前先按长度粗估，避免为超大请求分配内存
    let estimated = payload.len() / 4 * 3;
    if estimated > max_bytes.saturating_add(2) {
        return Err(DescribeError::PayloadTooLarge {
            size: estimated,
            limit: max_bytes,
        });
    }

    let bytes = STANDARD.decode(payload.as_bytes())?;
    if bytes.len() > max_bytes {
        return Err(DescribeError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// 根据字节内容识别格式并解码，统一转换成 RGB8
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DescribeError> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

pub fn decode_payload(payload: &str, max_bytes: usize) -> Result<RgbImage, DescribeError> {
    let bytes = decode_base64(payload, max_bytes)?;
    decode_image(&bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage, RgbaImage};
    use std::io::Cursor;

    /// 测试用：内存中生成一张 PNG 并编码成 base64
    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    pub(crate) fn jpeg_base64(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Jpeg(90)).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn decodes_png_payload() {
        let img = decode_payload(&png_base64(8, 4), 1 << 20).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(img.get_pixel(0, 0), &Rgb([200, 30, 30]));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let payload = format!("  {}\n", png_base64(2, 2));
        assert!(decode_payload(&payload, 1 << 20).is_ok());
    }

    #[test]
    fn accepts_line_wrapped_base64() {
        let payload = png_base64(16, 16);
        let wrapped = payload
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));

        let img = decode_payload(&wrapped, 1 << 20).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
    }

    #[test]
    fn decodes_jpeg_payload() {
        let img = decode_payload(&jpeg_base64(24, 16), 1 << 20).unwrap();
        assert_eq!(img.dimensions(), (24, 16));
        // JPEG 有损，只检查颜色大致还在
        let px = img.get_pixel(12, 8);
        assert!(px[0] > 150 && px[1] < 90 && px[2] < 90);
    }

    #[test]
    fn huge_limit_does_not_overflow() {
        assert!(decode_payload(&png_base64(2, 2), usize::MAX).is_ok());
    }

    #[test]
    fn converts_rgba_to_rgb() {
        let img = RgbaImage::from_pixel(3, 3, image::Rgba([1, 2, 3, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();

        let rgb = decode_image(&buf.into_inner()).unwrap();
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([1, 2, 3]));
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_payload("not-valid-base64!!", 1 << 20).unwrap_err();
        assert!(matches!(err, DescribeError::Base64(_)));
    }

    #[test]
    fn rejects_bytes_that_are_not_an_image() {
        let payload = STANDARD.encode(b"definitely not a picture");
        let err = decode_payload(&payload, 1 << 20).unwrap_err();
        assert!(matches!(err, DescribeError::Image(_)));
    }

    #[test]
    fn rejects_oversize_payload() {
        let payload = png_base64(64, 64);
        let err = decode_payload(&payload, 16).unwrap_err();
        assert!(matches!(err, DescribeError::PayloadTooLarge { limit: 16, .. }));
    }
}
