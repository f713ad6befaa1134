
//! Write images to in-memory files and read them back,
//! checking the decoded pixels against the encoded ones.

use hdrfile::prelude::*;
use smallvec::smallvec;
use std::io::Cursor;

fn single_channel_header(
    size: Vec2<usize>,
    tile_size: Vec2<usize>,
    level_mode: LevelMode,
    compression: Compression,
    line_order: LineOrder,
) -> Header {
    Header::new(
        ChannelList::new(smallvec![ChannelDescription::named("Y", SampleType::F32)]),
        compression,
        line_order,
        IntegerBounds::from_dimensions(size),
    ).with_tiles(TileDescription { tile_size, level_mode })
}

fn gradient(x: i32, y: i32) -> f32 {
    x as f32 + 10.0 * y as f32
}

fn gradient_slice(window: IntegerBounds) -> Slice {
    let mut slice = Slice::new(SampleType::F32, window);

    for y in window.position.y() ..= window.max().y() {
        for x in window.position.x() ..= window.max().x() {
            slice.set_sample(x, y, Sample::F32(gradient(x, y)));
        }
    }

    slice
}

/// Write all tiles of all levels in increasing file order.
fn write_all_tiles(writer: &mut TiledWriter<Cursor<&mut Vec<u8>>>) -> UnitResult {
    let geometry = writer.geometry().clone();

    match geometry.level_mode() {
        LevelMode::Singular | LevelMode::MipMap => {
            for level in 0 .. geometry.num_levels()? {
                for tile_y in 0 .. geometry.num_y_tiles(level)? {
                    for tile_x in 0 .. geometry.num_x_tiles(level)? {
                        writer.write_tile_level(tile_x, tile_y, level)?;
                    }
                }
            }
        }

        LevelMode::RipMap => {
            for level_y in 0 .. geometry.num_y_levels() {
                for level_x in 0 .. geometry.num_x_levels() {
                    for tile_y in 0 .. geometry.num_y_tiles(level_y)? {
                        for tile_x in 0 .. geometry.num_x_tiles(level_x)? {
                            writer.write_tile(tile_x, tile_y, level_x, level_y)?;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

#[test]
fn one_level_uncompressed_round_trip() {
    // the classic smallest interesting image:
    // 4x4 pixels, 2x2 tiles of 2x2 pixels each
    let window = IntegerBounds::from_dimensions(Vec2(4, 4));
    let header = single_channel_header(
        Vec2(4, 4), Vec2(2, 2), LevelMode::Singular,
        Compression::Uncompressed, LineOrder::Increasing,
    );

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    assert_eq!(writer.geometry().num_x_tiles(0).unwrap(), 2);
    assert_eq!(writer.geometry().num_y_tiles(0).unwrap(), 2);

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();

    write_all_tiles(&mut writer).unwrap();
    writer.close().unwrap();

    // read back every tile and compare every pixel
    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();
    assert!(reader.all_tiles_are_present());

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();

    for tile_y in 0 .. 2 {
        for tile_x in 0 .. 2 {
            reader.read_tile_level(tile_x, tile_y, 0).unwrap();
        }
    }

    let frame_buffer = reader.take_frame_buffer();
    let result = frame_buffer.get(&Text::from("Y")).unwrap();

    for y in 0 .. 4 {
        for x in 0 .. 4 {
            assert_eq!(result.sample(x, y), Sample::F32(gradient(x, y)));
        }
    }
}

#[test]
fn mip_map_level_counts_match_the_formula() {
    let header = single_channel_header(
        Vec2(1000, 800), Vec2(64, 64), LevelMode::MipMap,
        Compression::Uncompressed, LineOrder::Increasing,
    );

    let mut bytes = Vec::new();
    let writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();
    let geometry = writer.geometry();

    // floor(log2(1000)) + 1
    assert_eq!(geometry.num_x_levels(), 10);
    assert_eq!(geometry.num_y_levels(), 10);

    assert_eq!(geometry.level_width(3).unwrap(), 125);
    assert_eq!(geometry.level_height(3).unwrap(), 100);
    assert_eq!(geometry.num_x_tiles(3).unwrap(), 2);

    // the file was never closed, which is fine for a probe
}

#[test]
fn out_of_order_writes_produce_the_sequential_file() {
    let window = IntegerBounds::from_dimensions(Vec2(4, 4));

    let write_in_order = |tiles: &[(usize, usize)]| -> Vec<u8> {
        let header = single_channel_header(
            Vec2(4, 4), Vec2(2, 2), LevelMode::Singular,
            Compression::Uncompressed, LineOrder::Increasing,
        );

        let mut bytes = Vec::new();
        let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert("Y", gradient_slice(window));
        writer.set_frame_buffer(frame_buffer).unwrap();

        for &(tile_x, tile_y) in tiles {
            writer.write_tile_level(tile_x, tile_y, 0).unwrap();
        }

        writer.close().unwrap();
        bytes
    };

    let sequential = write_in_order(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    let scrambled = write_in_order(&[(1, 1), (0, 1), (1, 0), (0, 0)]);

    // the buffering engine must hide the order of the calls completely
    assert_eq!(sequential, scrambled);
}

#[test]
fn decreasing_line_order_writes_bottom_tiles_first() {
    let window = IntegerBounds::from_dimensions(Vec2(4, 4));

    let write_in_order = |tiles: &[(usize, usize)]| -> Vec<u8> {
        let header = single_channel_header(
            Vec2(4, 4), Vec2(2, 2), LevelMode::Singular,
            Compression::Uncompressed, LineOrder::Decreasing,
        );

        let mut bytes = Vec::new();
        let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert("Y", gradient_slice(window));
        writer.set_frame_buffer(frame_buffer).unwrap();

        for &(tile_x, tile_y) in tiles {
            writer.write_tile_level(tile_x, tile_y, 0).unwrap();
        }

        writer.close().unwrap();
        bytes
    };

    let sequential = write_in_order(&[(0, 1), (1, 1), (0, 0), (1, 0)]);
    let scrambled = write_in_order(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    assert_eq!(sequential, scrambled);

    // the pixels survive the reordering
    let mut reader = TiledReader::read_from_buffered(Cursor::new(scrambled)).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();
    reader.read_pixels(0, 3).unwrap();

    let frame_buffer = reader.take_frame_buffer();
    let result = frame_buffer.get(&Text::from("Y")).unwrap();
    assert_eq!(result.sample(3, 2), Sample::F32(gradient(3, 2)));
}

#[test]
fn random_line_order_stores_tiles_in_call_order() {
    let window = IntegerBounds::from_dimensions(Vec2(4, 2));
    let header = single_channel_header(
        Vec2(4, 2), Vec2(2, 2), LevelMode::Singular,
        Compression::Uncompressed, LineOrder::Random,
    );

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();

    // backwards on purpose: random order files do not reorder
    writer.write_tile_level(1, 0, 0).unwrap();
    writer.write_tile_level(0, 0, 0).unwrap();
    writer.close().unwrap();

    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();

    // the first block in the file is the tile that was written first
    let (tile, _) = reader.raw_tile_data().unwrap();
    assert_eq!(tile, TileCoordinates::new((1, 0), (0, 0)));

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();

    reader.read_tile_level(0, 0, 0).unwrap();
    reader.read_tile_level(1, 0, 0).unwrap();

    let frame_buffer = reader.take_frame_buffer();
    let result = frame_buffer.get(&Text::from("Y")).unwrap();
    assert_eq!(result.sample(2, 1), Sample::F32(gradient(2, 1)));
}

#[test]
fn mip_map_round_trip_with_zip_compression() {
    // 4x4 pixels with 2x2 tiles: levels of 4, 2 and 1 pixels
    let header = single_channel_header(
        Vec2(4, 4), Vec2(2, 2), LevelMode::MipMap,
        Compression::Zip16, LineOrder::Increasing,
    );

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();
    assert_eq!(writer.geometry().num_levels().unwrap(), 3);

    // each level gets its own gradient, over its own pixel window
    for level in 0 .. 3 {
        let level_window = writer.geometry().data_window_for_level(level, level).unwrap();

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert("Y", gradient_slice(level_window));
        writer.set_frame_buffer(frame_buffer).unwrap();

        for tile_y in 0 .. writer.geometry().num_y_tiles(level).unwrap() {
            for tile_x in 0 .. writer.geometry().num_x_tiles(level).unwrap() {
                writer.write_tile_level(tile_x, tile_y, level).unwrap();
            }
        }
    }

    writer.close().unwrap();

    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.level_mode(), LevelMode::MipMap);

    for level in 0 .. 3 {
        let level_window = reader.geometry().data_window_for_level(level, level).unwrap();

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert("Y", Slice::new(SampleType::F32, level_window));
        reader.set_frame_buffer(frame_buffer).unwrap();

        for tile_y in 0 .. reader.geometry().num_y_tiles(level).unwrap() {
            for tile_x in 0 .. reader.geometry().num_x_tiles(level).unwrap() {
                reader.read_tile_level(tile_x, tile_y, level).unwrap();
            }
        }

        let frame_buffer = reader.take_frame_buffer();
        let result = frame_buffer.get(&Text::from("Y")).unwrap();

        for y in level_window.position.y() ..= level_window.max().y() {
            for x in level_window.position.x() ..= level_window.max().x() {
                assert_eq!(result.sample(x, y), Sample::F32(gradient(x, y)));
            }
        }
    }
}

#[test]
fn rip_map_round_trip_visits_every_level_pair() {
    let header = single_channel_header(
        Vec2(4, 2), Vec2(2, 2), LevelMode::RipMap,
        Compression::Rle, LineOrder::Increasing,
    );

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let geometry = writer.geometry().clone();
    assert_eq!(geometry.num_x_levels(), 3);
    assert_eq!(geometry.num_y_levels(), 2);

    for level_y in 0 .. geometry.num_y_levels() {
        for level_x in 0 .. geometry.num_x_levels() {
            let level_window = geometry.data_window_for_level(level_x, level_y).unwrap();

            let mut frame_buffer = FrameBuffer::new();
            frame_buffer.insert("Y", gradient_slice(level_window));
            writer.set_frame_buffer(frame_buffer).unwrap();

            for tile_y in 0 .. geometry.num_y_tiles(level_y).unwrap() {
                for tile_x in 0 .. geometry.num_x_tiles(level_x).unwrap() {
                    writer.write_tile(tile_x, tile_y, level_x, level_y).unwrap();
                }
            }
        }
    }

    writer.close().unwrap();

    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();
    assert!(reader.geometry().num_levels().is_err());

    for level_y in 0 .. 2 {
        for level_x in 0 .. 3 {
            let level_window = reader.geometry().data_window_for_level(level_x, level_y).unwrap();

            let mut frame_buffer = FrameBuffer::new();
            frame_buffer.insert("Y", Slice::new(SampleType::F32, level_window));
            reader.set_frame_buffer(frame_buffer).unwrap();

            for tile_y in 0 .. reader.geometry().num_y_tiles(level_y).unwrap() {
                for tile_x in 0 .. reader.geometry().num_x_tiles(level_x).unwrap() {
                    reader.read_tile(tile_x, tile_y, level_x, level_y).unwrap();
                }
            }

            let frame_buffer = reader.take_frame_buffer();
            let result = frame_buffer.get(&Text::from("Y")).unwrap();
            let max = level_window.max();
            assert_eq!(result.sample(max.x(), max.y()), Sample::F32(gradient(max.x(), max.y())));
        }
    }
}

#[test]
fn channels_convert_skip_and_fill_on_read() {
    let window = IntegerBounds::from_dimensions(Vec2(3, 3));

    let header = Header::new(
        ChannelList::new(smallvec![
            ChannelDescription::named("B", SampleType::F32),
            ChannelDescription::named("G", SampleType::F16),
            ChannelDescription::named("R", SampleType::U32),
        ]),
        Compression::Uncompressed,
        LineOrder::Increasing,
        window,
    ).with_tiles(TileDescription { tile_size: Vec2(4, 4), level_mode: LevelMode::Singular });

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let mut frame_buffer = FrameBuffer::new();

    let mut blue = Slice::new(SampleType::F32, window);
    let mut green = Slice::new(SampleType::F16, window);
    let mut red = Slice::new(SampleType::U32, window);

    for y in 0 .. 3 {
        for x in 0 .. 3 {
            blue.set_sample(x, y, Sample::F32(0.25 * (x + 3 * y) as f32));
            green.set_sample(x, y, Sample::F16(f16::from_f32((x + 3 * y) as f32)));
            red.set_sample(x, y, Sample::U32((100 + x + 3 * y) as u32));
        }
    }

    frame_buffer.insert("B", blue);
    frame_buffer.insert("G", green);
    frame_buffer.insert("R", red);
    writer.set_frame_buffer(frame_buffer).unwrap();

    writer.write_tile_level(0, 0, 0).unwrap();
    writer.close().unwrap();

    // B converts f32 -> u32, G is skipped, R converts u32 -> f16,
    // and Z receives its fill value for every pixel
    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("B", Slice::new(SampleType::U32, window));
    frame_buffer.insert("R", Slice::new(SampleType::F16, window));
    frame_buffer.insert("Z", Slice::new(SampleType::F32, window).with_fill_value(-1.0));
    reader.set_frame_buffer(frame_buffer).unwrap();

    reader.read_tile_level(0, 0, 0).unwrap();

    let frame_buffer = reader.take_frame_buffer();
    let blue = frame_buffer.get(&Text::from("B")).unwrap();
    let red = frame_buffer.get(&Text::from("R")).unwrap();
    let depth = frame_buffer.get(&Text::from("Z")).unwrap();

    for y in 0 .. 3 {
        for x in 0 .. 3 {
            // saturating truncation of the non-negative float
            assert_eq!(blue.sample(x, y), Sample::U32((0.25 * (x + 3 * y) as f32) as u32));

            // value preserving promotion, exact for these small integers
            assert_eq!(red.sample(x, y), Sample::F16(f16::from_f32((100 + x + 3 * y) as f32)));

            assert_eq!(depth.sample(x, y), Sample::F32(-1.0));
        }
    }
}

#[test]
fn scan_line_view_matches_the_tiles() {
    // 16x16 pixels with 8x8 tiles
    let window = IntegerBounds::from_dimensions(Vec2(16, 16));
    let header = single_channel_header(
        Vec2(16, 16), Vec2(8, 8), LevelMode::Singular,
        Compression::ZipSingle, LineOrder::Increasing,
    );

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();
    write_all_tiles(&mut writer).unwrap();
    writer.close().unwrap();

    // assemble the strip from rows 5 to 10 out of the tiles
    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes.clone())).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window).with_fill_value(f64::NAN));
    reader.set_frame_buffer(frame_buffer).unwrap();
    reader.read_pixels(5, 10).unwrap();

    let strip_buffer = reader.take_frame_buffer();
    let strip = strip_buffer.get(&Text::from("Y")).unwrap();

    // read the same pixels tile by tile for comparison
    let mut tile_reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    tile_reader.set_frame_buffer(frame_buffer).unwrap();

    for tile_y in 0 .. 2 {
        for tile_x in 0 .. 2 {
            tile_reader.read_tile_level(tile_x, tile_y, 0).unwrap();
        }
    }

    let tile_buffer = tile_reader.take_frame_buffer();
    let tiled = tile_buffer.get(&Text::from("Y")).unwrap();

    for y in 5 ..= 10 {
        for x in 0 .. 16 {
            assert_eq!(strip.sample(x, y), tiled.sample(x, y));
            assert_eq!(strip.sample(x, y), Sample::F32(gradient(x, y)));
        }
    }

    // rows outside the strip were never touched
    assert_eq!(strip.sample(1, 0), Sample::F32(0.0));
    assert_eq!(strip.sample(1, 15), Sample::F32(0.0));
}

#[test]
fn copy_pixels_clones_the_compressed_tiles() {
    let window = IntegerBounds::from_dimensions(Vec2(13, 9));
    let header = single_channel_header(
        Vec2(13, 9), Vec2(4, 4), LevelMode::Singular,
        Compression::Zip16, LineOrder::Increasing,
    );

    let mut original = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut original), header.clone()).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();
    write_all_tiles(&mut writer).unwrap();
    writer.close().unwrap();

    // stream the raw tiles into a second file without recompressing
    let mut reader = TiledReader::read_from_buffered(Cursor::new(original.clone())).unwrap();

    let mut copy = Vec::new();
    let mut copier = TiledWriter::write_to_buffered(Cursor::new(&mut copy), header).unwrap();
    copier.copy_pixels(&mut reader).unwrap();
    copier.close().unwrap();

    // equal headers and equal tiles must produce the identical file
    assert_eq!(original, copy);

    // copying into a file that already has tiles is rejected
    let mut reader = TiledReader::read_from_buffered(Cursor::new(original)).unwrap();
    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();
    reader.read_tile_level(1, 1, 0).unwrap();

    let header = reader.header().clone();
    let mut rejected = Vec::new();
    let mut half_full = TiledWriter::write_to_buffered(Cursor::new(&mut rejected), header).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    half_full.set_frame_buffer(frame_buffer).unwrap();
    half_full.write_tile_level(0, 0, 0).unwrap();

    assert!(matches!(half_full.copy_pixels(&mut reader), Err(Error::Logic(_))));
}

#[test]
fn scan_line_file_round_trip() {
    let window = IntegerBounds::new(Vec2(-3, 10), Vec2(21, 40));

    let header = Header::new(
        ChannelList::new(smallvec![
            ChannelDescription::named("A", SampleType::F16),
            ChannelDescription::named("Y", SampleType::F32),
        ]),
        Compression::Zip16,
        LineOrder::Increasing,
        window,
    );

    let mut bytes = Vec::new();
    let mut writer = ScanlineWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let mut alpha = Slice::new(SampleType::F16, window);
    for y in window.position.y() ..= window.max().y() {
        for x in window.position.x() ..= window.max().x() {
            alpha.set_sample(x, y, Sample::F16(f16::from_f32(((x + y) % 7) as f32)));
        }
    }

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("A", alpha);
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();

    writer.write_pixels().unwrap();
    writer.close().unwrap();

    let mut reader = ScanlineReader::read_from_buffered(Cursor::new(bytes)).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("A", Slice::new(SampleType::F16, window));
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();

    // read the image in two strips, the second one upside down
    reader.read_pixels(10, 30).unwrap();
    reader.read_pixels(49, 31).unwrap();

    let frame_buffer = reader.take_frame_buffer();
    let alpha = frame_buffer.get(&Text::from("A")).unwrap();
    let luma = frame_buffer.get(&Text::from("Y")).unwrap();

    for y in window.position.y() ..= window.max().y() {
        for x in window.position.x() ..= window.max().x() {
            assert_eq!(alpha.sample(x, y), Sample::F16(f16::from_f32(((x + y) % 7) as f32)));
            assert_eq!(luma.sample(x, y), Sample::F32(gradient(x, y)));
        }
    }
}

#[test]
fn unified_input_chooses_the_flavour() {
    let window = IntegerBounds::from_dimensions(Vec2(6, 6));

    // a tiled file
    let tiled_header = single_channel_header(
        Vec2(6, 6), Vec2(4, 4), LevelMode::Singular,
        Compression::Uncompressed, LineOrder::Increasing,
    );

    let mut tiled_bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut tiled_bytes), tiled_header).unwrap();
    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();
    write_all_tiles(&mut writer).unwrap();
    writer.close().unwrap();

    // a scan line file with the same pixels
    let scan_line_header = Header::new(
        ChannelList::new(smallvec![ChannelDescription::named("Y", SampleType::F32)]),
        Compression::Uncompressed,
        LineOrder::Increasing,
        window,
    );

    let mut scan_line_bytes = Vec::new();
    let mut writer = ScanlineWriter::write_to_buffered(Cursor::new(&mut scan_line_bytes), scan_line_header).unwrap();
    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();
    writer.write_pixels().unwrap();
    writer.close().unwrap();

    // both files read identically through the unified input
    let mut results = Vec::new();

    for bytes in [tiled_bytes, scan_line_bytes] {
        let mut input = Input::read_from_buffered(Cursor::new(bytes)).unwrap();

        let mut frame_buffer = FrameBuffer::new();
        frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
        input.set_frame_buffer(frame_buffer).unwrap();
        input.read_pixels(0, 5).unwrap();

        // each flavour rejects the raw access of the other
        if input.is_tiled() {
            assert!(matches!(input.raw_pixel_data(0), Err(Error::InvalidArgument(_))));
        }
        else {
            assert!(matches!(input.raw_tile_data(), Err(Error::InvalidArgument(_))));
        }

        results.push(input.take_frame_buffer());
    }

    assert_eq!(results[0], results[1]);

    let luma = results[0].get(&Text::from("Y")).unwrap();
    assert_eq!(luma.sample(5, 5), Sample::F32(gradient(5, 5)));
}

#[test]
fn random_pixels_survive_compression_bitwise() {
    use rand::{Rng, SeedableRng};
    let mut random = rand::rngs::StdRng::seed_from_u64(42);

    let window = IntegerBounds::new(Vec2(-5, 3), Vec2(17, 13));

    let header = Header::new(
        ChannelList::new(smallvec![
            ChannelDescription::named("L", SampleType::F32),
            ChannelDescription::named("half", SampleType::F16),
            ChannelDescription::named("id", SampleType::U32),
        ]),
        Compression::Zip16,
        LineOrder::Increasing,
        window,
    ).with_tiles(TileDescription { tile_size: Vec2(6, 5), level_mode: LevelMode::Singular });

    let mut luma = Slice::new(SampleType::F32, window);
    let mut half = Slice::new(SampleType::F16, window);
    let mut id = Slice::new(SampleType::U32, window);

    for y in window.position.y() ..= window.max().y() {
        for x in window.position.x() ..= window.max().x() {
            luma.set_sample(x, y, Sample::F32(random.gen_range(-1000.0 .. 1000.0_f32)));
            half.set_sample(x, y, Sample::F16(f16::from_f32(random.gen_range(-8.0 .. 8.0_f32))));
            id.set_sample(x, y, Sample::U32(random.gen()));
        }
    }

    let mut bytes = Vec::new();
    let mut writer = TiledWriter::write_to_buffered(Cursor::new(&mut bytes), header).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("L", luma.clone());
    frame_buffer.insert("half", half.clone());
    frame_buffer.insert("id", id.clone());
    writer.set_frame_buffer(frame_buffer).unwrap();

    write_all_tiles(&mut writer).unwrap();
    writer.close().unwrap();

    let mut reader = TiledReader::read_from_buffered(Cursor::new(bytes)).unwrap();

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("L", Slice::new(SampleType::F32, window));
    frame_buffer.insert("half", Slice::new(SampleType::F16, window));
    frame_buffer.insert("id", Slice::new(SampleType::U32, window));
    reader.set_frame_buffer(frame_buffer).unwrap();

    for tile_y in 0 .. reader.geometry().num_y_tiles(0).unwrap() {
        for tile_x in 0 .. reader.geometry().num_x_tiles(0).unwrap() {
            reader.read_tile_level(tile_x, tile_y, 0).unwrap();
        }
    }

    let frame_buffer = reader.take_frame_buffer();

    // same-typed channels must round trip bitwise
    for y in window.position.y() ..= window.max().y() {
        for x in window.position.x() ..= window.max().x() {
            assert_eq!(frame_buffer.get(&Text::from("L")).unwrap().sample(x, y), luma.sample(x, y));
            assert_eq!(frame_buffer.get(&Text::from("half")).unwrap().sample(x, y), half.sample(x, y));
            assert_eq!(frame_buffer.get(&Text::from("id")).unwrap().sample(x, y), id.sample(x, y));
        }
    }
}

#[test]
fn files_survive_a_trip_through_the_file_system() {
    let window = IntegerBounds::from_dimensions(Vec2(5, 5));
    let header = single_channel_header(
        Vec2(5, 5), Vec2(4, 4), LevelMode::Singular,
        Compression::Rle, LineOrder::Increasing,
    );

    let path = std::env::temp_dir().join("hdrfile_roundtrip_test.hdr");

    let mut writer = TiledWriter::create(&path, header).unwrap();
    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", gradient_slice(window));
    writer.set_frame_buffer(frame_buffer).unwrap();
    write_all_tiles_to_file(&mut writer).unwrap();
    writer.close().unwrap();

    let mut input = Input::open(&path).unwrap();
    assert!(input.is_tiled());

    let mut frame_buffer = FrameBuffer::new();
    frame_buffer.insert("Y", Slice::new(SampleType::F32, window));
    input.set_frame_buffer(frame_buffer).unwrap();
    input.read_pixels(0, 4).unwrap();

    let frame_buffer = input.take_frame_buffer();
    let result = frame_buffer.get(&Text::from("Y")).unwrap();
    assert_eq!(result.sample(4, 4), Sample::F32(gradient(4, 4)));

    std::fs::remove_file(&path).ok();
}

/// Write all tiles of a single level file backed by a real file.
fn write_all_tiles_to_file(
    writer: &mut TiledWriter<std::io::BufWriter<std::fs::File>>
) -> UnitResult {
    for tile_y in 0 .. writer.geometry().num_y_tiles(0)? {
        for tile_x in 0 .. writer.geometry().num_x_tiles(0)? {
            writer.write_tile_level(tile_x, tile_y, 0)?;
        }
    }

    Ok(())
}
